//! Controller-specific error types.
//!
//! This module defines error types specific to the PodSet controller
//! that are not covered by upstream library errors.

use cluster_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the PodSet controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object is missing metadata the controller relies on
    /// (e.g. no uid/name to build an owner reference from)
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
