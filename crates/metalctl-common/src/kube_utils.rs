//! Kubernetes client construction

use std::path::{Path, PathBuf};
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::error::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Where to find credentials and endpoint for one store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Kubeconfig file; `None` infers from the environment
    pub kubeconfig: Option<PathBuf>,
    /// Context within the kubeconfig; `None` uses the current context
    pub context: Option<String>,
}

impl ConnectionDescriptor {
    /// Descriptor for an explicit kubeconfig file
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            kubeconfig: Some(path.into()),
            context: None,
        }
    }

    /// Select a context within the kubeconfig
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Kubeconfig path, if explicit
    pub fn path(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }
}

/// Create a kube client for a connection descriptor
pub async fn create_client(connection: &ConnectionDescriptor) -> Result<Client, Error> {
    create_client_with_timeout(connection, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client with custom timeouts
pub async fn create_client_with_timeout(
    connection: &ConnectionDescriptor,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let options = KubeConfigOptions {
        context: connection.context.clone(),
        ..Default::default()
    };

    let mut config = match connection.path() {
        Some(path) => {
            debug!(kubeconfig = %path.display(), "Loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::client("create_client", format!("failed to read kubeconfig: {}", e))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| {
                    Error::client("create_client", format!("failed to load kubeconfig: {}", e))
                })?
        }
        None if connection.context.is_some() => Config::from_kubeconfig(&options)
            .await
            .map_err(|e| Error::client("create_client", format!("failed to load kubeconfig: {}", e)))?,
        None => Config::infer()
            .await
            .map_err(|e| Error::client("create_client", format!("failed to infer config: {}", e)))?,
    };

    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config)
        .map_err(|e| Error::client("create_client", format!("failed to create client: {}", e)))
}
