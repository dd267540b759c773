//! Cluster API lifecycle manager contract and its clusterctl adapter
//!
//! Provider bootstrapping and the move of Cluster API objects are delegated to
//! an external lifecycle manager. [`ClusterctlLifecycle`] drives the
//! `clusterctl` binary; every invocation is bounded by a timeout and is never
//! retried.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::kube_utils::ConnectionDescriptor;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Default bound on one clusterctl invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from the lifecycle manager
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The command could not be started
    #[error("failed to execute {command}: {message}")]
    ExecutionFailed {
        /// Command description
        command: String,
        /// Spawn error
        message: String,
    },

    /// The command did not finish in time
    #[error("{command} timed out after {timeout:?}")]
    TimedOut {
        /// Command description
        command: String,
        /// Configured bound
        timeout: Duration,
    },

    /// The command exited unsuccessfully
    #[error("{command} failed: {stderr}")]
    CommandFailed {
        /// Command description
        command: String,
        /// Captured standard error
        stderr: String,
    },
}

/// Providers handed to the lifecycle manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSet {
    /// Core provider
    pub core: String,
    /// Bootstrap provider
    pub bootstrap: String,
    /// Control plane provider
    pub control_plane: String,
    /// Infrastructure provider
    pub infrastructure: String,
}

impl Default for ProviderSet {
    fn default() -> Self {
        Self {
            core: "cluster-api".to_string(),
            bootstrap: "kubeadm".to_string(),
            control_plane: "kubeadm".to_string(),
            infrastructure: "metal3".to_string(),
        }
    }
}

/// What a lifecycle delete removes besides provider components
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Also delete provider namespaces
    pub include_namespace: bool,
    /// Also delete provider CRDs
    pub include_crds: bool,
}

/// External component that installs, removes and moves Cluster API providers
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait LifecycleManager: Send + Sync {
    /// Install providers
    async fn init(&self, providers: &ProviderSet) -> Result<(), LifecycleError>;

    /// Remove every installed provider
    async fn delete(&self, options: DeleteOptions) -> Result<(), LifecycleError>;

    /// Move the lifecycle manager's own objects between clusters
    async fn move_objects(
        &self,
        source: &ConnectionDescriptor,
        target: &ConnectionDescriptor,
        namespace: &str,
    ) -> Result<(), LifecycleError>;
}

/// [`LifecycleManager`] running the `clusterctl` binary
#[derive(Debug, Clone)]
pub struct ClusterctlLifecycle {
    program: PathBuf,
    cluster: ConnectionDescriptor,
    config: Option<PathBuf>,
    timeout: Duration,
}

impl ClusterctlLifecycle {
    /// Adapter managing providers on `cluster`
    pub fn new(cluster: ConnectionDescriptor) -> Self {
        Self {
            program: PathBuf::from("clusterctl"),
            cluster,
            config: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use a clusterctl configuration file
    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    /// Use a different binary
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Bound each invocation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn init_args(&self, providers: &ProviderSet) -> Vec<String> {
        let mut args = vec!["init".to_string()];
        push_connection(&mut args, "--kubeconfig", &self.cluster);
        args.extend([
            "--core".to_string(),
            providers.core.clone(),
            "--bootstrap".to_string(),
            providers.bootstrap.clone(),
            "--control-plane".to_string(),
            providers.control_plane.clone(),
            "--infrastructure".to_string(),
            providers.infrastructure.clone(),
        ]);
        self.push_config(&mut args);
        args
    }

    fn delete_args(&self, options: DeleteOptions) -> Vec<String> {
        let mut args = vec!["delete".to_string(), "--all".to_string()];
        push_connection(&mut args, "--kubeconfig", &self.cluster);
        if options.include_namespace {
            args.push("--include-namespace".to_string());
        }
        if options.include_crds {
            args.push("--include-crd".to_string());
        }
        self.push_config(&mut args);
        args
    }

    fn move_args(
        &self,
        source: &ConnectionDescriptor,
        target: &ConnectionDescriptor,
        namespace: &str,
    ) -> Vec<String> {
        let mut args = vec!["move".to_string()];
        push_connection(&mut args, "--kubeconfig", source);
        push_connection(&mut args, "--to-kubeconfig", target);
        if !namespace.is_empty() {
            args.extend(["--namespace".to_string(), namespace.to_string()]);
        }
        self.push_config(&mut args);
        args
    }

    fn push_config(&self, args: &mut Vec<String>) {
        if let Some(config) = &self.config {
            args.extend(["--config".to_string(), config.display().to_string()]);
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<(), LifecycleError> {
        let description = format!("clusterctl {}", args.first().map(String::as_str).unwrap_or(""));
        info!(command = %description, "Running lifecycle manager");

        let mut cmd = Command::new(&self.program);
        cmd.args(&args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                warn!(command = %description, timeout = ?self.timeout, "Lifecycle manager timed out");
                LifecycleError::TimedOut {
                    command: description.clone(),
                    timeout: self.timeout,
                }
            })?
            .map_err(|e| LifecycleError::ExecutionFailed {
                command: description.clone(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            info!(command = %description, "Lifecycle manager succeeded");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(command = %description, error = %stderr, "Lifecycle manager failed");
            Err(LifecycleError::CommandFailed {
                command: description,
                stderr,
            })
        }
    }
}

fn push_connection(args: &mut Vec<String>, flag: &str, connection: &ConnectionDescriptor) {
    if let Some(path) = connection.path() {
        args.extend([flag.to_string(), path.display().to_string()]);
    }
    if let Some(context) = &connection.context {
        args.extend([format!("{}-context", flag), context.clone()]);
    }
}

#[async_trait]
impl LifecycleManager for ClusterctlLifecycle {
    async fn init(&self, providers: &ProviderSet) -> Result<(), LifecycleError> {
        self.run(self.init_args(providers)).await
    }

    async fn delete(&self, options: DeleteOptions) -> Result<(), LifecycleError> {
        self.run(self.delete_args(options)).await
    }

    async fn move_objects(
        &self,
        source: &ConnectionDescriptor,
        target: &ConnectionDescriptor,
        namespace: &str,
    ) -> Result<(), LifecycleError> {
        self.run(self.move_args(source, target, namespace)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> ClusterctlLifecycle {
        ClusterctlLifecycle::new(ConnectionDescriptor::from_path("/kc/mgmt"))
    }

    #[test]
    fn test_init_args_name_all_providers() {
        let args = lifecycle()
            .with_config(Some(PathBuf::from("/etc/clusterctl.yaml")))
            .init_args(&ProviderSet::default());
        assert_eq!(
            args,
            vec![
                "init",
                "--kubeconfig",
                "/kc/mgmt",
                "--core",
                "cluster-api",
                "--bootstrap",
                "kubeadm",
                "--control-plane",
                "kubeadm",
                "--infrastructure",
                "metal3",
                "--config",
                "/etc/clusterctl.yaml",
            ]
        );
    }

    #[test]
    fn test_delete_args_follow_options() {
        let args = lifecycle().delete_args(DeleteOptions::default());
        assert_eq!(args, vec!["delete", "--all", "--kubeconfig", "/kc/mgmt"]);

        let args = lifecycle().delete_args(DeleteOptions {
            include_namespace: true,
            include_crds: true,
        });
        assert!(args.contains(&"--include-namespace".to_string()));
        assert!(args.contains(&"--include-crd".to_string()));
    }

    #[test]
    fn test_move_args_carry_both_clusters_and_contexts() {
        let source = ConnectionDescriptor::from_path("/kc/bootstrap");
        let target = ConnectionDescriptor::from_path("/kc/target").with_context("admin@target");
        let args = lifecycle().move_args(&source, &target, "metal3");
        assert_eq!(
            args,
            vec![
                "move",
                "--kubeconfig",
                "/kc/bootstrap",
                "--to-kubeconfig",
                "/kc/target",
                "--to-kubeconfig-context",
                "admin@target",
                "--namespace",
                "metal3",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_execution_failure() {
        let lifecycle = lifecycle().with_program("/nonexistent/clusterctl");
        let err = lifecycle.init(&ProviderSet::default()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_command_failure() {
        let lifecycle = lifecycle().with_program("false");
        let err = lifecycle
            .delete(DeleteOptions::default())
            .await
            .unwrap_err();
        match err {
            LifecycleError::CommandFailed { command, .. } => assert_eq!(command, "clusterctl delete"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
