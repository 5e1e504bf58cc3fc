//! Error types for the model layer.

use thiserror::Error;
use trellis_store::StoreError;
use trellis_types::ObjectId;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A required attribute was absent after validation and defaulting.
    #[error("missing required attribute: {attr}")]
    MissingRequired { attr: String },

    /// An update arrived without its identifying attributes.
    #[error("update requires {what}")]
    IdentityRequired { what: &'static str },

    /// An id attribute did not resolve to a valid object id.
    #[error("invalid id: {raw}")]
    InvalidId { raw: String },

    /// Single read or delete of an id that does not exist.
    #[error("{ns} {id} not found")]
    NotFound { ns: String, id: ObjectId },

    /// Child creation under a parent that does not exist.
    #[error("parent {ns} {id} does not exist")]
    ParentMissing { ns: String, id: ObjectId },

    /// A delete guard refused the deletion.
    #[error("delete denied for {ns} {id}")]
    DeleteDenied { ns: String, id: ObjectId },

    /// A post-create or post-delete hook failed.
    #[error("hook failed: {0}")]
    Hook(#[source] anyhow::Error),

    /// Storage-layer failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
