//! ALUSKORT Schemas: canonical contracts shared by every service.
//!
//! Everything that crosses a service boundary is defined here:
//! - Canonical alerts as they leave ingestion
//! - Investigation state and the append-only decision chain
//! - The closed audit event vocabulary and record shapes
//! - FP pattern definitions with governance fields
//! - Incident recency scoring and IOC cache TTL tiers
//!
//! Contract violations (missing tenant, unknown event type, illegal state
//! transition) are rejected here, at the edge, before they can propagate.

pub mod alert;
pub mod audit;
pub mod error;
pub mod fp;
pub mod investigation;
pub mod scoring;

pub use alert::{CanonicalAlert, Severity};
pub use audit::{
    Actor, ActorType, AuditContext, AuditEventEnvelope, AuditEventType, AuditRecord,
    AuditSeverity, EventCategory,
};
pub use error::ContractError;
pub use fp::{EntityMatcher, FpPattern, PatternScope, PatternStatus};
pub use investigation::{
    ActionTier, AttestationStatus, Classification, DecisionEntry, GraphState, InvestigationState,
    Priority, RecommendedAction, TenantTier,
};
pub use scoring::{ioc_ttl, recency_score};
