//! Resource installer
//!
//! [`upsert`] converges a store onto a manifest: absent resources are created,
//! present ones are merge-patched so server-managed fields the manifest does
//! not set are left alone. Running it twice is a no-op the second time apart
//! from empty patches. [`remove`] deletes a manifest's resources, tolerating
//! ones that are already gone and reporting every other failure.

mod error;
mod installer;

pub use error::{InstallError, RemoveError, RemoveFailure};
pub use installer::{remove, upsert, DeleteScope, RemoveSummary, UpsertSummary};
