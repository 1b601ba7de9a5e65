//! ALUSKORT Orchestrator: drives an investigation deterministically through
//! the state graph.
//!
//! The orchestrator owns a `GraphState` exclusively from ingest to terminal
//! state. Enrichment is the only true parallelism inside one investigation;
//! everything else is sequenced by the graph. Every transition emits audit.

pub mod approval;
pub mod arena;
pub mod constraints;
pub mod enrichment;
pub mod error;
pub mod pipeline;

pub use approval::{ApprovalGate, ApprovalGateManager, ApprovalOutcome};
pub use arena::InvestigationArena;
pub use constraints::{AgentRole, ConstraintBlock, ExecutorConstraints};
pub use enrichment::{run_enrichment, Enricher, EnrichmentOutput};
pub use error::OrchestratorError;
pub use pipeline::{Orchestrator, OrchestratorConfig, ReasoningVerdict};
