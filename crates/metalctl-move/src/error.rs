//! Error types for host migration

use std::time::Duration;

use metalctl_common::{LifecycleError, ResourceKey, StoreError};
use thiserror::Error;

use crate::orchestrator::MovePhase;

/// Errors from a migration
#[derive(Debug, Error)]
pub enum MoveError {
    /// A store call failed
    #[error("{phase} failed: {source}")]
    Store {
        /// Phase that was running
        phase: MovePhase,
        /// Wrapped store failure
        #[source]
        source: StoreError,
    },

    /// An object did not have the shape its kind requires
    #[error("{phase} failed: {source}")]
    InvalidResource {
        /// Phase that was running
        phase: MovePhase,
        /// Validation failure
        #[source]
        source: metalctl_common::Error,
    },

    /// The source reconciler kept writing to a paused object
    #[error("{resource} still changing {timeout:?} after being paused")]
    PauseNotObserved {
        /// Object that did not settle
        resource: ResourceKey,
        /// How long it was watched
        timeout: Duration,
    },

    /// The source object lost its paused marker while being watched
    #[error("{resource} was unpaused by another writer")]
    PauseReverted {
        /// Object that lost the marker
        resource: ResourceKey,
    },

    /// A quiet-period check that cannot succeed within its timeout
    #[error("pause quiet period {quiet_period:?} must be shorter than the timeout {timeout:?}")]
    InvalidPauseObservation {
        /// Requested quiet period
        quiet_period: Duration,
        /// Requested timeout
        timeout: Duration,
    },

    /// The lifecycle manager's own move failed
    #[error("lifecycle manager move failed: {0}")]
    Lifecycle(#[from] LifecycleError),
}

impl MoveError {
    /// Phase the error happened in, when it happened inside one
    pub fn phase(&self) -> Option<MovePhase> {
        match self {
            MoveError::Store { phase, .. } | MoveError::InvalidResource { phase, .. } => Some(*phase),
            MoveError::PauseNotObserved { .. }
            | MoveError::PauseReverted { .. }
            | MoveError::InvalidPauseObservation { .. } => {
                Some(MovePhase::PausedSource)
            }
            MoveError::Lifecycle(_) => None,
        }
    }

    /// The wrapped store failure, if this is one
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            MoveError::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}
