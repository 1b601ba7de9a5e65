//! ALUSKORT Router: picks a model for a task under capability, severity,
//! latency, cost, and health constraints.
//!
//! The override chain is deterministic; every applied override appends to the
//! decision's `reason` so routing is explainable after the fact. Provider
//! health lives in per-provider circuit breakers; when the fleet degrades,
//! the router attaches an advisory policy the orchestrator enforces.

pub mod breaker;
pub mod concurrency;
pub mod error;
pub mod escalation;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod router;

pub use breaker::{BreakerState, CircuitBreaker};
pub use concurrency::{ConcurrencyController, SlotPermit, TenantQuota};
pub use error::RouterError;
pub use escalation::EscalationBudget;
pub use health::{DegradationLevel, DegradationPolicy, ProviderHealthRegistry};
pub use registry::{
    default_fallbacks, default_registry, ModelSpec, TaskCapabilities, TaskKind, Tier,
};
pub use router::{ModelRouter, RoutingContext, RoutingDecision};
