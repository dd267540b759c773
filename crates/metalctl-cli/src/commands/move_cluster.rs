//! Move command - move bare metal hosts and Cluster API objects between management clusters
//!
//! Usage: metalctl move --to-kubeconfig target.yaml [-n namespace] [--skip-bmo] [--skip-capi]
//!
//! The target cluster must already have the provider components installed.
//! Hosts go through the phased migration; `clusterctl move` runs once their
//! status is copied, before machine and node identities are rewritten.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use metalctl_common::LifecycleManager;
use metalctl_move::{
    run_move, LifecycleMove, MigratableKinds, MigrationOrchestrator, MigrationSession,
    MoveOptions, PauseObservation,
};
use tracing::{info, warn};

use super::{store_client, SkipArgs};
use crate::config::target_connection;
use crate::{Error, GlobalArgs, Result};

/// Move bare metal hosts and Cluster API objects
#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Kubeconfig of the destination management cluster
    #[arg(long)]
    pub to_kubeconfig: Option<PathBuf>,

    /// Kubeconfig context of the destination management cluster
    #[arg(long)]
    pub to_context: Option<String>,

    /// Namespace hosting the workload cluster. If unspecified, every namespace is moved
    #[arg(short, long, default_value = "", env = "METALCTL_NAMESPACE")]
    pub namespace: String,

    /// Seconds to wait for the source operator to stop writing paused hosts; 0 skips the check
    #[arg(long, default_value_t = 60)]
    pub pause_timeout: u64,

    /// Seconds a paused host must stay unchanged to count as paused
    #[arg(long, default_value_t = 5)]
    pub pause_quiet_period: u64,

    #[command(flatten)]
    pub skip: SkipArgs,
}

impl MoveArgs {
    fn move_options(&self) -> Result<MoveOptions> {
        let pause_observation = if self.pause_timeout == 0 {
            PauseObservation::Disabled
        } else {
            PauseObservation::quiet(
                Duration::from_secs(self.pause_quiet_period),
                Duration::from_secs(self.pause_timeout),
            )
            .map_err(|_| {
                Error::validation(format!(
                    "--pause-quiet-period ({}s) must be shorter than --pause-timeout ({}s)",
                    self.pause_quiet_period, self.pause_timeout
                ))
            })?
        };
        Ok(MoveOptions {
            pause_observation,
            ..Default::default()
        })
    }
}

pub async fn run(global: &GlobalArgs, args: MoveArgs) -> Result<()> {
    let target = target_connection(args.to_kubeconfig.as_deref(), args.to_context.as_deref())
        .ok_or_else(|| {
            Error::validation("please specify a target cluster using the --to-kubeconfig flag")
        })?;
    let options = args.move_options()?;
    let source = global.connection();
    let lifecycle = global.lifecycle(source.clone());

    if args.skip.skip_bmo {
        if args.skip.skip_capi {
            warn!("Both --skip-bmo and --skip-capi given, nothing to move");
            return Ok(());
        }
        info!("Skipping bare metal host move");
        lifecycle
            .move_objects(&source, &target, &args.namespace)
            .await?;
        info!("Cluster API objects moved");
        return Ok(());
    }

    let session = MigrationSession {
        source: store_client(&source).await?,
        target: store_client(&target).await?,
        namespace: args.namespace.clone(),
        kinds: MigratableKinds::metal3(),
    };
    let mut orchestrator = MigrationOrchestrator::new(session, options);

    let delegate = if args.skip.skip_capi {
        info!("Skipping cluster-api move");
        None
    } else {
        Some(LifecycleMove {
            manager: &lifecycle,
            source: &source,
            target: &target,
        })
    };

    let report = run_move(&mut orchestrator, delegate).await?;
    info!(
        move_id = %report.move_id,
        hosts = report.created + report.updated,
        machines_rewritten = report.machines_rewritten,
        nodes_rewritten = report.nodes_rewritten,
        machines_missing = report.machines_missing,
        "Move complete"
    );
    Ok(())
}
