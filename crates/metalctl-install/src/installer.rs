//! Idempotent install and removal of manifests

use metalctl_common::registry::{crd_kind, namespace_kind};
use metalctl_common::{Manifest, PatchMode, ResourceClient};
use tracing::{debug, info, warn};

use crate::error::{InstallError, RemoveError, RemoveFailure};

/// Counts from a successful upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Resources that did not exist and were created
    pub created: usize,
    /// Resources that existed and were merge-patched
    pub patched: usize,
}

/// Counts from a removal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveSummary {
    /// Resources deleted
    pub deleted: usize,
    /// Resources that were already absent
    pub missing: usize,
}

/// Create every resource that is absent and merge-patch every one that exists
///
/// Resources are processed in manifest order. The first failure other than a
/// NotFound on lookup aborts the whole upsert; callers recover by running
/// the same manifest again.
pub async fn upsert(
    manifest: &Manifest,
    client: &dyn ResourceClient,
) -> Result<UpsertSummary, InstallError> {
    let mut summary = UpsertSummary::default();

    for resource in manifest.iter() {
        let key = resource.key();
        let existing = match client.get(&resource.gvk, &resource.namespace, &resource.name).await {
            Ok(existing) => Some(existing),
            Err(e) if e.is_not_found() => None,
            Err(source) => return Err(InstallError { resource: key, source }),
        };

        match existing {
            None => {
                client
                    .create(resource)
                    .await
                    .map_err(|source| InstallError {
                        resource: key.clone(),
                        source,
                    })?;
                info!(resource = %key, "Created resource");
                summary.created += 1;
            }
            Some(existing) => {
                let mut desired = resource.clone();
                desired.resource_version = existing.resource_version;
                client
                    .patch(&desired, PatchMode::Merge)
                    .await
                    .map_err(|source| InstallError {
                        resource: key.clone(),
                        source,
                    })?;
                debug!(resource = %key, "Patched existing resource");
                summary.patched += 1;
            }
        }
    }

    info!(
        created = summary.created,
        patched = summary.patched,
        "Manifest upserted"
    );
    Ok(summary)
}

/// Delete every resource in the manifest, tolerating absent ones
///
/// Failures are collected and do not stop the remaining deletions. Resources
/// are deleted in reverse manifest order so contents go before their namespace.
pub async fn remove(
    manifest: &Manifest,
    client: &dyn ResourceClient,
) -> Result<RemoveSummary, RemoveError> {
    let mut summary = RemoveSummary::default();
    let mut failures = Vec::new();

    let resources: Vec<_> = manifest.iter().collect();
    for resource in resources.into_iter().rev() {
        let key = resource.key();
        match client.delete(&resource.gvk, &resource.namespace, &resource.name).await {
            Ok(()) => {
                debug!(resource = %key, "Deleted resource");
                summary.deleted += 1;
            }
            Err(e) if e.is_not_found() => {
                debug!(resource = %key, "Resource already absent");
                summary.missing += 1;
            }
            Err(error) => {
                warn!(resource = %key, error = %error, "Failed to delete resource");
                failures.push(RemoveFailure { resource: key, error });
            }
        }
    }

    if failures.is_empty() {
        info!(
            deleted = summary.deleted,
            missing = summary.missing,
            "Manifest removed"
        );
        Ok(summary)
    } else {
        Err(RemoveError { failures, summary })
    }
}

/// Which cluster-wide resources a delete may remove
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteScope {
    /// Remove Namespace resources
    pub include_namespace: bool,
    /// Remove CustomResourceDefinition resources
    pub include_crds: bool,
}

impl DeleteScope {
    /// Copy of `manifest` without the kinds this scope keeps
    pub fn apply(&self, manifest: &Manifest) -> Manifest {
        let mut excluded = Vec::new();
        if !self.include_namespace {
            excluded.push(namespace_kind());
        }
        if !self.include_crds {
            excluded.push(crd_kind());
        }
        manifest.without_kinds(&excluded)
    }
}
