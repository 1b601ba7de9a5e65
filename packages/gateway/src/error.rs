//! Gateway error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Monthly hard cap reached. Never silently downgraded.
    #[error("monthly spend limit exceeded: spent ${spent:.2} of ${cap:.2}")]
    SpendLimitExceeded { spent: f64, cap: f64 },

    /// The model call failed after the router's policy was exhausted.
    #[error("model call failed: {0}")]
    ModelCall(String),

    /// Redaction-map crypto failure (wrong key, corrupt ciphertext).
    #[error("redaction map cipher failure: {0}")]
    Cipher(String),

    #[error("prompt assembly failed: {0}")]
    Assembly(String),

    #[error(transparent)]
    Store(#[from] aluskort_persistence::StoreError),
}
