//! End-to-end move: host phases plus the lifecycle manager's own move

use metalctl_common::{ConnectionDescriptor, LifecycleManager};
use tracing::info;

use crate::error::MoveError;
use crate::orchestrator::{MigrationOrchestrator, MovePhase, MoveReport};

/// Connection descriptors handed to the lifecycle manager
#[derive(Clone, Copy)]
pub struct LifecycleMove<'a> {
    /// Lifecycle manager to delegate to
    pub manager: &'a dyn LifecycleManager,
    /// Cluster objects are moved from
    pub source: &'a ConnectionDescriptor,
    /// Cluster objects are moved to
    pub target: &'a ConnectionDescriptor,
}

/// Run every phase, delegating the lifecycle manager's move after STATUS_SYNCED
///
/// Machines are owned by the lifecycle manager, so they only exist at the
/// target once its move has run; IDENTITY_FIXED therefore follows it. Without
/// a lifecycle manager the phases run back to back.
pub async fn run_move(
    orchestrator: &mut MigrationOrchestrator,
    lifecycle: Option<LifecycleMove<'_>>,
) -> Result<MoveReport, MoveError> {
    while let Some(phase) = orchestrator.step().await? {
        info!(phase = %phase, move_id = %orchestrator.report().move_id, "Move phase complete");
        if phase != MovePhase::StatusSynced {
            continue;
        }
        if let Some(lifecycle) = &lifecycle {
            lifecycle
                .manager
                .move_objects(lifecycle.source, lifecycle.target, orchestrator.namespace())
                .await?;
            info!(namespace = %orchestrator.namespace(), "Lifecycle manager move complete");
        }
    }
    Ok(orchestrator.report().clone())
}
