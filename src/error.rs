//! Error types for the fleet synchronization controllers

use thiserror::Error;

/// Main error type for fleet synchronization
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error not covered by a more specific variant
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The addressed object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Namespace of the missing object
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// Optimistic-concurrency conflict (stale resourceVersion or racing create)
    #[error("conflict: {0}")]
    Conflict(String),

    /// A mutation callback refused to render the concrete object
    #[error("mutation error: {0}")]
    Mutation(String),

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid controller configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a not-found error for the given object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error with the given message
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a mutation error with the given message
    pub fn mutation(msg: impl Into<String>) -> Self {
        Self::Mutation(msg.into())
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True if the error means the addressed object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }

    /// True if the error is an optimistic-concurrency conflict worth retrying
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Kube(kube::Error::Api(e)) => e.code == 409,
            _ => false,
        }
    }
}

/// Convert a kube error on a named object into our error, classifying 404 and 409
pub(crate) fn from_kube(err: kube::Error, kind: &str, namespace: &str, name: &str) -> Error {
    match err {
        kube::Error::Api(ref e) if e.code == 404 => Error::not_found(kind, namespace, name),
        kube::Error::Api(ref e) if e.code == 409 => {
            Error::conflict(format!("{} {}/{}: {}", kind, namespace, name, e.message))
        }
        other => Error::Kube(other),
    }
}
