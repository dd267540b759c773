//! Installer error types

use std::fmt;

use metalctl_common::{ResourceKey, StoreError};
use thiserror::Error;

/// Upsert stopped at the first failing resource
#[derive(Debug, Error)]
#[error("upsert of {resource} failed: {source}")]
pub struct InstallError {
    /// Resource being installed when the failure happened
    pub resource: ResourceKey,
    /// Store failure
    #[source]
    pub source: StoreError,
}

/// One resource that could not be removed
#[derive(Debug, Clone)]
pub struct RemoveFailure {
    /// Resource that failed
    pub resource: ResourceKey,
    /// Store failure
    pub error: StoreError,
}

impl fmt::Display for RemoveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.error.kind)
    }
}

/// Outcome of a removal that failed for at least one resource
#[derive(Debug, Clone, Error)]
#[error("failed to remove {} resource(s): {}", .failures.len(), join(.failures))]
pub struct RemoveError {
    /// Every resource that could not be removed
    pub failures: Vec<RemoveFailure>,
    /// Counts for the resources that were handled
    pub summary: crate::RemoveSummary,
}

impl RemoveError {
    /// Failure recorded for a resource, if any
    pub fn failure_for(&self, resource: &ResourceKey) -> Option<&RemoveFailure> {
        self.failures.iter().find(|f| f.resource == *resource)
    }
}

fn join(failures: &[RemoveFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
