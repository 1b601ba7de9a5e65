//! Orchestrator error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Schema or transition contract violated; the investigation fails.
    #[error(transparent)]
    Contract(#[from] aluskort_schemas::ContractError),

    /// Store write on the investigation state failed; unrecoverable.
    #[error("investigation state write failed: {0}")]
    StateWrite(String),

    #[error(transparent)]
    Gateway(#[from] aluskort_gateway::GatewayError),

    #[error(transparent)]
    Store(#[from] aluskort_persistence::StoreError),

    /// Anything else that leaves the investigation unrecoverable.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),
}
