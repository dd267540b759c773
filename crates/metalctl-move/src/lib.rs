//! Cross-cluster move of bare metal hosts
//!
//! Hosts are re-created at the target with new uids, so everything that
//! refers to a host by `metal3://<uid>` must be rewritten afterwards.
//!
//! ## Architecture
//!
//! ```text
//! Source                         Orchestrator                      Target
//! ──────                         ────────────                      ──────
//! BareMetalHosts ◄── pause ───── PAUSED_SOURCE
//!                  (observe quiet period, optional)
//! BareMetalHosts ─── list ─────► REPLICATED ───── create/update ──► BareMetalHosts
//! status ─────────── list ─────► STATUS_SYNCED ── update status ──► status
//!                                (lifecycle manager move) ────────► Metal3Machines
//! old uids ───────── list ─────► IDENTITY_FIXED ◄── new uids ────── BareMetalHosts
//!                                       └──────── rewrite ────────► Metal3Machines, Nodes
//!                                RESUMED ──────── unpause ────────► BareMetalHosts
//! ```
//!
//! Every phase is idempotent. A failed move is recovered by running it again.

mod driver;
mod error;
pub mod identity;
mod orchestrator;
mod pause;

pub use driver::{run_move, LifecycleMove};
pub use error::MoveError;
pub use orchestrator::{
    DependentKind, MigratableKinds, MigrationOrchestrator, MigrationSession, MoveOptions,
    MovePhase, MoveReport,
};
pub use pause::{await_quiescence, PauseObservation};
