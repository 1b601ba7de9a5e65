//! ALUSKORT Audit: sole writer of the tamper-evident audit store.
//!
//! Every audit event lands in a per-tenant hash chain: each record carries
//! the SHA-256 of its predecessor's canonical form, so any rewrite breaks
//! the chain at the point of tampering. The service consumes the audit
//! topic in tenant order, stores evidence artifacts in cold object storage,
//! verifies chains on four schedules, and serves the evidence API.

pub mod api;
pub mod chain;
pub mod consumer;
pub mod error;
pub mod evidence;
pub mod hashing;
pub mod retention;
pub mod storage;
pub mod verification;

pub use chain::{AuditStore, ChainHead, InMemoryAuditStore};
pub use consumer::AuditConsumer;
pub use error::AuditError;
pub use evidence::{build_evidence_package, EvidencePackage, EvidenceStore};
pub use hashing::{canonical_json, record_hash, GENESIS_HASH};
pub use retention::{RetentionJob, RetentionOutcome};
pub use verification::{verify_chain, ChainVerifier, VerificationRun};
