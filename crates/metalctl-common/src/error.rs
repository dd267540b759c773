//! Error types for metalctl store access
//!
//! Every call through a [`ResourceClient`](crate::ResourceClient) fails with a
//! [`StoreError`], which classifies the failure into one [`ErrorKind`] and
//! carries the operation and resource it was issued for. Callers decide which
//! kinds they tolerate (NotFound in removal, AlreadyExists in replication)
//! by matching on the kind, never on message text.

use std::fmt;

use thiserror::Error;

use crate::resource::ResourceKey;

/// Classification of a failed store call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The addressed object does not exist
    NotFound,
    /// Create was issued for an object that already exists
    AlreadyExists,
    /// The write carried a stale resourceVersion
    Conflict,
    /// Credentials were rejected or lack permission
    Unauthorized,
    /// The store could not be reached or is overloaded
    Unavailable,
    /// The store rejected the request or object as malformed
    Invalid,
    /// Anything the store reported that fits no other kind
    Unknown,
}

impl ErrorKind {
    /// Classify an API status response by HTTP code and machine-readable reason
    pub fn from_status(code: u16, reason: &str) -> Self {
        match code {
            404 => ErrorKind::NotFound,
            409 if reason == "AlreadyExists" => ErrorKind::AlreadyExists,
            409 => ErrorKind::Conflict,
            401 | 403 => ErrorKind::Unauthorized,
            400 | 422 => ErrorKind::Invalid,
            429 | 500..=599 => ErrorKind::Unavailable,
            _ => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Invalid => "Invalid",
            ErrorKind::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Store operation a [`StoreError`] was raised from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Get
    Get,
    /// List
    List,
    /// Create
    Create,
    /// Update
    Update,
    /// Update of the status subresource
    UpdateStatus,
    /// Merge patch
    Patch,
    /// Delete
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::UpdateStatus => "update status of",
            Operation::Patch => "patch",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A failed store call, wrapped with the operation and resource identity
#[derive(Debug, Clone, Error)]
#[error("{operation} {resource} failed ({kind}): {message}")]
pub struct StoreError {
    /// Failure classification
    pub kind: ErrorKind,
    /// Operation that failed
    pub operation: Operation,
    /// Resource the operation addressed (name is empty for List)
    pub resource: ResourceKey,
    /// Message reported by the store
    pub message: String,
}

impl StoreError {
    /// Create a store error
    pub fn new(
        kind: ErrorKind,
        operation: Operation,
        resource: ResourceKey,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation,
            resource,
            message: message.into(),
        }
    }

    /// Wrap a kube-rs error, classifying it by API status where one is present
    pub fn from_kube(operation: Operation, resource: ResourceKey, err: kube::Error) -> Self {
        let kind = match &err {
            kube::Error::Api(response) => ErrorKind::from_status(response.code, &response.reason),
            kube::Error::Auth(_) => ErrorKind::Unauthorized,
            kube::Error::HyperError(_) | kube::Error::Service(_) => ErrorKind::Unavailable,
            kube::Error::SerdeError(_) => ErrorKind::Invalid,
            _ => ErrorKind::Unknown,
        };
        let message = match &err {
            kube::Error::Api(response) => response.message.clone(),
            other => other.to_string(),
        };
        Self::new(kind, operation, resource, message)
    }

    /// True for NotFound
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// True for AlreadyExists
    pub fn is_already_exists(&self) -> bool {
        self.kind == ErrorKind::AlreadyExists
    }
}

/// Errors outside of store calls: decoding, validation, client construction
#[derive(Debug, Error)]
pub enum Error {
    /// Manifest text could not be parsed
    #[error("failed to parse manifest: {message}")]
    Manifest {
        /// Parser message
        message: String,
    },

    /// A document did not have the shape its kind requires
    #[error("invalid resource {resource}: {message}")]
    InvalidResource {
        /// Kind/namespace/name, or a best-effort description when unknown
        resource: String,
        /// What is wrong with it
        message: String,
    },

    /// Manifest or kubeconfig file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// A kube client could not be built
    #[error("client error [{context}]: {message}")]
    Client {
        /// Step that failed
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create an invalid-resource error
    pub fn invalid(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResource {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a client construction error
    pub fn client(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Client {
            context: context.into(),
            message: message.into(),
        }
    }
}
