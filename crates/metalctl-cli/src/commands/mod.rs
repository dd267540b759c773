//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use metalctl_common::{
    components_path, create_client, ConnectionDescriptor, KindRegistry, KubeResourceClient,
    Manifest, ProviderSet,
};
use tracing::debug;

use crate::{Error, Result};

pub mod delete;
pub mod init;
pub mod move_cluster;

/// Which half of the work to leave out
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct SkipArgs {
    /// Skip the bare metal operator part
    #[arg(long)]
    pub skip_bmo: bool,

    /// Skip the cluster-api part
    #[arg(long)]
    pub skip_capi: bool,
}

/// Where the rendered bare metal operator components come from
#[derive(Args, Debug, Clone, Default)]
pub struct ManifestArgs {
    /// Rendered manifest file, applied in the order given (repeatable)
    #[arg(long = "manifest", value_name = "FILE")]
    pub manifests: Vec<PathBuf>,

    /// Root of a local provider repository
    #[arg(long, env = "METALCTL_ARTIFACTS_PATH")]
    pub artifacts_path: Option<PathBuf>,

    /// Provider label inside the repository
    #[arg(long, default_value = "baremetal-operator")]
    pub provider_label: String,

    /// Provider version inside the repository
    #[arg(long)]
    pub version: Option<String>,
}

impl ManifestArgs {
    /// Files to read, explicit manifests first
    pub fn paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = self.manifests.clone();
        if let Some(artifacts) = &self.artifacts_path {
            let version = self.version.as_deref().ok_or_else(|| {
                Error::validation("--version is required with --artifacts-path")
            })?;
            paths.push(components_path(artifacts, &self.provider_label, version));
        }
        if paths.is_empty() {
            return Err(Error::validation(
                "no components given, use --manifest or --artifacts-path",
            ));
        }
        Ok(paths)
    }

    /// Read every file into one manifest
    pub async fn load(&self) -> Result<Manifest> {
        let mut manifest = Manifest::default();
        for path in self.paths()? {
            let part = Manifest::from_file(&path).await?;
            debug!(path = %path.display(), resources = part.len(), "Loaded manifest");
            manifest.extend(part);
        }
        Ok(manifest)
    }
}

/// Cluster API providers handed to clusterctl
#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    /// Core provider
    #[arg(long, default_value = "cluster-api")]
    pub core: String,

    /// Bootstrap provider
    #[arg(long, default_value = "kubeadm")]
    pub bootstrap: String,

    /// Control plane provider
    #[arg(long, default_value = "kubeadm")]
    pub control_plane: String,

    /// Infrastructure provider
    #[arg(long, default_value = "metal3")]
    pub infrastructure: String,
}

impl ProviderArgs {
    pub fn provider_set(&self) -> ProviderSet {
        ProviderSet {
            core: self.core.clone(),
            bootstrap: self.bootstrap.clone(),
            control_plane: self.control_plane.clone(),
            infrastructure: self.infrastructure.clone(),
        }
    }
}

/// Store client for one cluster, with kinds discovered from its API server
pub async fn store_client(connection: &ConnectionDescriptor) -> Result<Arc<KubeResourceClient>> {
    let client = create_client(connection).await?;
    let registry = Arc::new(KindRegistry::discover(client.clone()).await);
    Ok(Arc::new(KubeResourceClient::new(client, registry)))
}
