//! Store error taxonomy.

use thiserror::Error;

/// Errors surfaced by the store bindings.
///
/// `Transient` is the only retryable kind; everything else fails fast.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("contract violation at store boundary: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Unavailable(_))
    }
}
