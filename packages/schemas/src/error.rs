//! Contract violations rejected at the schema boundary.

use thiserror::Error;

/// A message or mutation that violates a canonical contract.
///
/// These are fail-fast errors: the offending payload goes to a DLQ with an
/// error envelope and the pipeline moves on.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("tenant_id is required on every cross-tenant interface")]
    MissingTenant,
    #[error("unknown audit event type: {0}")]
    UnknownEventType(String),
    #[error("severity '{0}' is outside the closed vocabulary")]
    InvalidSeverity(String),
    #[error("timestamp is not RFC 3339: {0}")]
    InvalidTimestamp(String),
    #[error("illegal investigation transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
    #[error("decision_chain is append-only; entry at index {0} would be rewritten")]
    ChainRewrite(usize),
    #[error("schema deserialization failed: {0}")]
    Deserialize(#[from] serde_json::Error),
}
