//! Error types for the view layer.

use thiserror::Error;
use trellis_model::ModelError;
use trellis_store::StoreError;

/// Result type for view operations.
pub type ViewResult<T> = Result<T, ViewError>;

/// Errors that can occur in view maintenance and composed-type operations.
#[derive(Debug, Error)]
pub enum ViewError {
    /// An operation named an entity type the engine was not composed with.
    #[error("unknown entity type: {0}")]
    UnknownType(String),

    /// A set name that was never declared (and is not the implicit `all`).
    #[error("invalid set: {0}")]
    InvalidSet(String),

    /// A relationship name or sorted-set attribute that was never declared.
    #[error("invalid relationship: {0}")]
    InvalidRelationship(String),

    /// A composition-time declaration problem. Raised when the engine is
    /// built, never at first use.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A relationship added/removed hook failed.
    #[error("relationship hook failed: {0}")]
    Hook(#[source] anyhow::Error),

    /// Model-layer failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Storage-layer failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
