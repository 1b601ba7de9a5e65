//! Router error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    /// Tenant exceeded its hourly call quota. Distinct from RPM backpressure,
    /// which blocks instead of erroring.
    #[error("tenant {tenant_id} exceeded hourly quota of {limit} calls")]
    QuotaExceeded { tenant_id: String, limit: u32 },

    /// No registered model satisfies the task's capabilities.
    #[error("no capability-compatible model for task {task}")]
    NoEligibleModel { task: String },

    /// Every provider's breaker is open.
    #[error("all providers unavailable")]
    AllProvidersDown,
}
