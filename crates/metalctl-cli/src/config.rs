//! Kubeconfig resolution
//!
//! The resolution chain (highest priority first):
//! 1. Explicit `--kubeconfig` / `--to-kubeconfig` flag
//! 2. The matching environment variable (`METALCTL_KUBECONFIG`, `METALCTL_TO_KUBECONFIG`)
//! 3. Fall back to kube default (`KUBECONFIG` env / `~/.kube/config` / in-cluster)

use std::path::{Path, PathBuf};

use metalctl_common::ConnectionDescriptor;

/// Environment fallback for `--kubeconfig`
pub const KUBECONFIG_ENV: &str = "METALCTL_KUBECONFIG";
/// Environment fallback for `--to-kubeconfig`
pub const TO_KUBECONFIG_ENV: &str = "METALCTL_TO_KUBECONFIG";

/// Resolve a kubeconfig path using the priority chain.
///
/// Returns `None` to use kube defaults.
pub fn resolve_kubeconfig(explicit: Option<&Path>, env_var: &str) -> Option<PathBuf> {
    resolve_from(explicit, std::env::var(env_var).ok())
}

fn resolve_from(explicit: Option<&Path>, env_value: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if !path.as_os_str().is_empty() {
            return Some(path.to_path_buf());
        }
    }

    env_value.filter(|p| !p.is_empty()).map(PathBuf::from)
}

/// Connection to the management cluster named by `--kubeconfig`/`--context`
pub fn connection(kubeconfig: Option<&Path>, context: Option<&str>) -> ConnectionDescriptor {
    descriptor(resolve_kubeconfig(kubeconfig, KUBECONFIG_ENV), context)
}

fn descriptor(path: Option<PathBuf>, context: Option<&str>) -> ConnectionDescriptor {
    let connection = match path {
        Some(path) => ConnectionDescriptor::from_path(path),
        None => ConnectionDescriptor::default(),
    };
    match context {
        Some(context) => connection.with_context(context),
        None => connection,
    }
}

/// Connection to the move target, which must resolve to a kubeconfig file
pub fn target_connection(kubeconfig: Option<&Path>, context: Option<&str>) -> Option<ConnectionDescriptor> {
    resolve_kubeconfig(kubeconfig, TO_KUBECONFIG_ENV).map(|path| descriptor(Some(path), context))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_explicit_wins() {
        let result = resolve_from(Some(Path::new("/explicit/path")), Some("/env/path".to_string()));
        assert_eq!(result, Some(PathBuf::from("/explicit/path")));
    }

    #[test]
    fn resolve_env_when_no_flag() {
        let result = resolve_from(None, Some("/env/path".to_string()));
        assert_eq!(result, Some(PathBuf::from("/env/path")));
    }

    #[test]
    fn resolve_empty_values_fall_through() {
        assert_eq!(resolve_from(Some(Path::new("")), Some(String::new())), None);
        assert_eq!(resolve_from(None, None), None);
    }

    #[test]
    fn descriptor_carries_context() {
        let connection = descriptor(Some(PathBuf::from("/tmp/kc")), Some("admin@mgmt"));
        assert_eq!(connection.path(), Some(Path::new("/tmp/kc")));
        assert_eq!(connection.context.as_deref(), Some("admin@mgmt"));

        let inferred = descriptor(None, None);
        assert_eq!(inferred, ConnectionDescriptor::default());
    }
}
