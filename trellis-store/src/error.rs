//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A verb was applied to a key holding a different kind of value.
    #[error("wrong kind at {key}: expected {expected}, found {found}")]
    KindMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A counter or score field did not parse as a number.
    #[error("malformed number at {key}: {raw:?}")]
    MalformedNumber { key: String, raw: String },

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}
