//! Resource store client abstraction
//!
//! [`ResourceClient`] is the single seam between the installer/orchestrator
//! and a live store. Production code uses
//! [`KubeResourceClient`](crate::KubeResourceClient); tests use the
//! mockall-generated `MockResourceClient` or the stateful
//! [`MemoryStore`](crate::testing::MemoryStore).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::resource::{GroupVersionKind, ManagedResource};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Partial update strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    /// JSON merge patch; fields absent from the patch are left untouched
    Merge,
}

/// Typed handle to one resource store
///
/// An empty namespace addresses cluster-scoped kinds, or all namespaces for `list`.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch one object
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<ManagedResource, StoreError>;

    /// List all objects of a kind in a namespace
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
    ) -> Result<Vec<ManagedResource>, StoreError>;

    /// Create an object; uid and resourceVersion must be unset
    ///
    /// Returns the stored object with its assigned uid and resourceVersion.
    async fn create(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError>;

    /// Replace an object; requires the current resourceVersion
    ///
    /// The status sub-document is not written.
    async fn update(&self, resource: &ManagedResource) -> Result<ManagedResource, StoreError>;

    /// Replace only the status sub-document; requires the current resourceVersion
    async fn update_status(
        &self,
        resource: &ManagedResource,
    ) -> Result<ManagedResource, StoreError>;

    /// Partially update an object against the store's current copy
    ///
    /// A resourceVersion carried in the patch is checked by the store.
    async fn patch(
        &self,
        resource: &ManagedResource,
        mode: PatchMode,
    ) -> Result<ManagedResource, StoreError>;

    /// Delete one object
    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError>;
}
