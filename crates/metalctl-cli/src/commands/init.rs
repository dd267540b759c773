//! Init command - install Metal3 components on a management cluster
//!
//! Usage: metalctl init --manifest bmo.yaml [--skip-bmo] [--skip-capi]
//!
//! 1. Upserts the rendered bare metal operator components
//! 2. Runs `clusterctl init` for the Cluster API providers

use clap::Args;
use metalctl_common::LifecycleManager;
use metalctl_install::upsert;
use tracing::info;

use super::{store_client, ManifestArgs, ProviderArgs, SkipArgs};
use crate::{GlobalArgs, Result};

/// Initialize a management cluster for Metal3
#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    #[command(flatten)]
    pub providers: ProviderArgs,

    #[command(flatten)]
    pub skip: SkipArgs,
}

pub async fn run(global: &GlobalArgs, args: InitArgs) -> Result<()> {
    let connection = global.connection();

    if args.skip.skip_bmo {
        info!("Skipping bare metal operator install");
    } else {
        let manifest = args.manifest.load().await?;
        let client = store_client(&connection).await?;
        let summary = upsert(&manifest, client.as_ref()).await?;
        info!(
            created = summary.created,
            patched = summary.patched,
            "Bare metal operator components installed"
        );
    }

    if args.skip.skip_capi {
        info!("Skipping cluster-api install");
    } else {
        global
            .lifecycle(connection)
            .init(&args.providers.provider_set())
            .await?;
        info!("Cluster API providers installed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cli, Commands, Error};
    use clap::Parser;

    fn parse(args: &[&str]) -> (GlobalArgs, InitArgs) {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Init(init) => (cli.global, init),
            other => panic!("expected init, got {:?}", other),
        }
    }

    #[test]
    fn test_provider_defaults() {
        let (_, args) = parse(&["metalctl", "init", "--manifest", "bmo.yaml"]);
        assert_eq!(args.providers.provider_set(), metalctl_common::ProviderSet::default());
        assert!(!args.skip.skip_bmo);
        assert!(!args.skip.skip_capi);
    }

    #[tokio::test]
    async fn test_skipping_everything_touches_nothing() {
        let (global, args) = parse(&["metalctl", "init", "--skip-bmo", "--skip-capi"]);
        run(&global, args).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_components_fail_before_connecting() {
        let (global, args) = parse(&["metalctl", "init", "--skip-capi"]);
        let err = run(&global, args).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
