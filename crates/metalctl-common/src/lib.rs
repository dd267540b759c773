//! Shared building blocks for metalctl
//!
//! - [`ManagedResource`]: tagged resource document with typed views for
//!   hosts and their dependents
//! - [`ResourceClient`]: async store contract, implemented over the Kubernetes
//!   API by [`KubeResourceClient`]
//! - [`KindRegistry`]: explicit kind to API resource mapping
//! - [`Manifest`]: ordered resources decoded from rendered YAML
//! - [`LifecycleManager`]: contract for the external Cluster API lifecycle
//!   manager, implemented by [`ClusterctlLifecycle`]

#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod kube_client;
pub mod kube_utils;
pub mod lifecycle;
pub mod manifest;
pub mod registry;
pub mod resource;
pub mod views;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{PatchMode, ResourceClient};
pub use error::{Error, ErrorKind, Operation, StoreError};
pub use kube_client::KubeResourceClient;
pub use kube_utils::{create_client, ConnectionDescriptor};
pub use lifecycle::{ClusterctlLifecycle, DeleteOptions, LifecycleError, LifecycleManager, ProviderSet};
pub use manifest::{components_path, Manifest};
pub use registry::{KindInfo, KindRegistry, Scope};
pub use resource::{
    GroupVersionKind, ManagedResource, ResourceKey, LAST_UPDATED_FIELD, PAUSED_ANNOTATION,
    PAUSED_VALUE,
};
pub use views::{ConsumerRef, DependentView, HostView, IdentityField};

/// Result type for non-store metalctl operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
