//! Audit service error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Malformed envelope; the message goes to the DLQ.
    #[error("invalid audit envelope: {0}")]
    InvalidEnvelope(String),

    /// Attempted mutation of stored records. Fatal.
    #[error("append-only violation: {0}")]
    AppendOnlyViolation(String),

    /// Chain head row is inconsistent with stored records.
    #[error("corrupt chain head for tenant {tenant_id}: {detail}")]
    CorruptHead { tenant_id: String, detail: String },

    #[error(transparent)]
    Store(#[from] aluskort_persistence::StoreError),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("export failure: {0}")]
    Export(String),
}
