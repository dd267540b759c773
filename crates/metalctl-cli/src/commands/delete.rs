//! Delete command - remove Metal3 components from a management cluster
//!
//! Usage: metalctl delete --manifest bmo.yaml [--include-namespace] [--include-crd]
//!
//! Namespaces and CRDs in the manifest are kept unless explicitly included,
//! for both the bare metal operator components and `clusterctl delete`, which
//! always removes every installed provider.

use clap::Args;
use metalctl_common::{DeleteOptions, LifecycleManager};
use metalctl_install::{remove, DeleteScope};
use tracing::info;

use super::{store_client, ManifestArgs, SkipArgs};
use crate::{GlobalArgs, Result};

/// Remove Metal3 and Cluster API components
#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(flatten)]
    pub skip: SkipArgs,

    /// Also delete the namespaces the providers are hosted in, with everything in them
    #[arg(long)]
    pub include_namespace: bool,

    /// Also delete the providers' CRDs, with every related object
    #[arg(long = "include-crd")]
    pub include_crds: bool,
}

impl DeleteArgs {
    fn scope(&self) -> DeleteScope {
        DeleteScope {
            include_namespace: self.include_namespace,
            include_crds: self.include_crds,
        }
    }

    fn lifecycle_options(&self) -> DeleteOptions {
        DeleteOptions {
            include_namespace: self.include_namespace,
            include_crds: self.include_crds,
        }
    }
}

pub async fn run(global: &GlobalArgs, args: DeleteArgs) -> Result<()> {
    let connection = global.connection();

    if args.skip.skip_bmo {
        info!("Skipping bare metal operator deletion");
    } else {
        let manifest = args.scope().apply(&args.manifest.load().await?);
        let client = store_client(&connection).await?;
        let summary = remove(&manifest, client.as_ref()).await?;
        info!(
            deleted = summary.deleted,
            missing = summary.missing,
            "Bare metal operator components deleted"
        );
    }

    if args.skip.skip_capi {
        info!("Skipping cluster-api deletion");
    } else {
        global
            .lifecycle(connection)
            .delete(args.lifecycle_options())
            .await?;
        info!("Cluster API providers deleted");
    }

    Ok(())
}
