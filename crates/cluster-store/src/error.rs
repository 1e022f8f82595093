//! Cluster store errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster API.
///
/// `NotFound` and `Conflict` are carved out of the generic Kubernetes
/// error because the reconcile algorithm treats them specially; every
/// other API failure is passed through unchanged so the caller's
/// backoff policy applies.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of the missing object (e.g. "PodSet", "Pod")
        kind: String,
        /// Name of the missing object
        name: String,
    },

    /// Optimistic-concurrency conflict on a write
    #[error("conflict writing {0}")]
    Conflict(String),

    /// The store is temporarily unreachable or unavailable
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object could not be serialized for the API call
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True for optimistic-concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}
