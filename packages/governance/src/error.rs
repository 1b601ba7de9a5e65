//! Governance error taxonomy.

use thiserror::Error;

use aluskort_schemas::PatternStatus;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("pattern {0} not found")]
    PatternNotFound(String),

    #[error("approver {0} already approved this pattern; a distinct second approver is required")]
    SameApprover(String),

    #[error("pattern {pattern_id} is {status:?}; operation requires {required:?}")]
    WrongStatus {
        pattern_id: String,
        status: PatternStatus,
        required: PatternStatus,
    },

    #[error("pattern {pattern_id} is {status:?}, which is terminal within this version")]
    Terminal {
        pattern_id: String,
        status: PatternStatus,
    },

    #[error("tenant {tenant_id} cannot leave shadow mode: {reason}")]
    GoLiveRefused { tenant_id: String, reason: String },

    #[error("invalid matcher: {0}")]
    InvalidMatcher(String),
}
