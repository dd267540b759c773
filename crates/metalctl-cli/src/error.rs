//! Error types for the CLI

use metalctl_common::LifecycleError;
use metalctl_install::{InstallError, RemoveError};
use metalctl_move::MoveError;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Common(#[from] metalctl_common::Error),

    #[error("error installing bare metal operator components: {0}")]
    Install(#[from] InstallError),

    #[error("error deleting bare metal operator components: {0}")]
    Remove(#[from] RemoveError),

    #[error("error while moving: {0}")]
    Move(#[from] MoveError),

    #[error("clusterctl error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }
}
