//! metalctl CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use metalctl_common::{ClusterctlLifecycle, ConnectionDescriptor};

/// metalctl - Metal3 management cluster tooling
#[derive(Parser, Debug)]
#[command(name = "metalctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Kubeconfig of the management cluster. If unspecified, default discovery rules apply
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context of the management cluster
    #[arg(long, global = true)]
    pub context: Option<String>,

    /// clusterctl configuration file
    #[arg(long, global = true, env = "METALCTL_CLUSTERCTL_CONFIG")]
    pub clusterctl_config: Option<PathBuf>,

    /// clusterctl binary to run
    #[arg(long, global = true, default_value = "clusterctl")]
    pub clusterctl: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// Log filter used when RUST_LOG is unset
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Connection to the management cluster
    pub fn connection(&self) -> ConnectionDescriptor {
        config::connection(self.kubeconfig.as_deref(), self.context.as_deref())
    }

    /// clusterctl adapter bound to `cluster`
    pub fn lifecycle(&self, cluster: ConnectionDescriptor) -> ClusterctlLifecycle {
        ClusterctlLifecycle::new(cluster)
            .with_program(self.clusterctl.clone())
            .with_config(self.clusterctl_config.clone())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a management cluster for Metal3
    Init(commands::init::InitArgs),
    /// Remove Metal3 and Cluster API components from a management cluster
    Delete(commands::delete::DeleteArgs),
    /// Move bare metal hosts and Cluster API objects to another management cluster
    Move(commands::move_cluster::MoveArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init(args) => commands::init::run(&self.global, args).await,
            Commands::Delete(args) => commands::delete::run(&self.global, args).await,
            Commands::Move(args) => commands::move_cluster::run(&self.global, args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_picks_filter() {
        let cli = Cli::try_parse_from(["metalctl", "-vv", "init", "--skip-bmo"]).unwrap();
        assert_eq!(cli.global.default_log_filter(), "trace");

        let cli = Cli::try_parse_from(["metalctl", "init", "--skip-bmo"]).unwrap();
        assert_eq!(cli.global.default_log_filter(), "info");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "metalctl",
            "delete",
            "--kubeconfig",
            "/tmp/mgmt.yaml",
            "--clusterctl-config",
            "/tmp/clusterctl.yaml",
            "--skip-bmo",
        ])
        .unwrap();
        assert_eq!(cli.global.kubeconfig, Some(PathBuf::from("/tmp/mgmt.yaml")));
        assert_eq!(
            cli.global.clusterctl_config,
            Some(PathBuf::from("/tmp/clusterctl.yaml"))
        );
        assert!(matches!(cli.command, Commands::Delete(_)));
    }
}
