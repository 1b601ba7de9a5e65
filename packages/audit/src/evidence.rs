//! Evidence store and evidence packages.
//!
//! Large artifacts (prompts, responses, retrieval context, raw alerts,
//! state snapshots) move to cold object storage keyed by audit id; the
//! record keeps only content-hashed references. The evidence package is the
//! exportable, chain-verified view of one investigation.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use aluskort_persistence::ObjectStore;
use aluskort_schemas::AuditRecord;

use crate::chain::AuditStore;
use crate::error::AuditError;
use crate::verification::verify_chain;

/// Artifact kinds recognized in `decision` payloads. Fields with these names
/// are offloaded when present.
const OFFLOAD_KINDS: &[&str] = &[
    "llm_prompt",
    "llm_response",
    "retrieval_context",
    "raw_alert",
    "investigation_snapshot",
];

/// Size above which a decision field moves to cold storage.
const OFFLOAD_THRESHOLD_BYTES: usize = 8 * 1024;

/// Cold evidence writer.
pub struct EvidenceStore {
    objects: Arc<dyn ObjectStore>,
}

/// `cold/{tenant}/{YYYY}/{MM}/{DD}/{audit_id}/{kind}.json`
pub fn evidence_key(record: &AuditRecord, kind: &str) -> String {
    let t = record.timestamp;
    format!(
        "cold/{}/{:04}/{:02}/{:02}/{}/{}.json",
        record.tenant_id,
        t.year(),
        t.month(),
        t.day(),
        record.audit_id,
        kind
    )
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl EvidenceStore {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Store one artifact, returning `(content_hash, uri)`.
    pub async fn put(
        &self,
        record: &AuditRecord,
        kind: &str,
        payload: &serde_json::Value,
    ) -> Result<(String, String), AuditError> {
        let bytes = serde_json::to_vec(payload)?;
        let hash = sha256_hex(&bytes);
        let key = evidence_key(record, kind);
        let stored = self.objects.put(&key, bytes).await?;
        Ok((hash, stored.uri))
    }

    /// Move oversized decision fields to cold storage. Fail-open: on any
    /// storage failure the record simply keeps empty refs.
    pub async fn offload(&self, record: &AuditRecord) -> Vec<String> {
        let mut refs = Vec::new();
        let Some(decision) = record.decision.as_object() else {
            return refs;
        };
        for kind in OFFLOAD_KINDS {
            let Some(payload) = decision.get(*kind) else {
                continue;
            };
            let size = payload.to_string().len();
            if size < OFFLOAD_THRESHOLD_BYTES {
                continue;
            }
            match self.put(record, kind, payload).await {
                Ok((hash, uri)) => refs.push(format!("{uri}#sha256={hash}")),
                Err(e) => {
                    tracing::warn!(error = %e, kind = kind, "evidence offload failed, continuing without refs");
                }
            }
        }
        refs
    }

    pub async fn fetch(&self, key: &str) -> Result<Vec<u8>, AuditError> {
        Ok(self.objects.get(key).await?)
    }
}

/// Self-contained, chain-verified export of one investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePackage {
    pub tenant_id: String,
    pub investigation_id: Uuid,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    /// All records for the investigation, ordered by sequence
    pub records: Vec<AuditRecord>,
    pub state_transitions: Vec<serde_json::Value>,
    pub llm_interactions: Vec<serde_json::Value>,
    pub actions: Vec<serde_json::Value>,
    pub approvals: Vec<serde_json::Value>,
    pub chain_verified: bool,
    pub chain_errors: Vec<String>,
    pub package_hash: String,
}

/// Assemble the package for `(tenant, investigation)`.
pub async fn build_evidence_package(
    store: &dyn AuditStore,
    tenant_id: &str,
    investigation_id: Uuid,
    include_raw_prompts: bool,
) -> Result<EvidencePackage, AuditError> {
    let records = store.by_investigation(tenant_id, investigation_id).await?;

    let of_category = |category: aluskort_schemas::EventCategory| -> Vec<serde_json::Value> {
        records
            .iter()
            .filter(|r| r.event_category == category)
            .map(|r| {
                serde_json::json!({
                    "audit_id": r.audit_id,
                    "event_type": r.event_type,
                    "timestamp": r.timestamp,
                    "decision": r.decision,
                    "outcome": r.outcome,
                })
            })
            .collect()
    };

    let mut llm_interactions: Vec<serde_json::Value> = records
        .iter()
        .filter(|r| r.context.llm.is_some())
        .map(|r| {
            serde_json::json!({
                "audit_id": r.audit_id,
                "llm": r.context.llm,
                "evidence_refs": r.evidence_refs,
            })
        })
        .collect();
    if !include_raw_prompts {
        for interaction in &mut llm_interactions {
            if let Some(obj) = interaction.as_object_mut() {
                obj.remove("evidence_refs");
            }
        }
    }

    // Verify linkage over the returned subset: hashes must recompute, and
    // each record's previous_hash must chain within the tenant's history.
    let (chain_verified, chain_errors) = verify_subset(store, &records).await?;

    let mut package = EvidencePackage {
        tenant_id: tenant_id.to_string(),
        investigation_id,
        generated_at: chrono::Utc::now(),
        state_transitions: of_category(aluskort_schemas::EventCategory::Decision),
        actions: of_category(aluskort_schemas::EventCategory::Action),
        approvals: of_category(aluskort_schemas::EventCategory::Approval),
        llm_interactions,
        records,
        chain_verified,
        chain_errors,
        package_hash: String::new(),
    };
    let mut value = serde_json::to_value(&package)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("package_hash");
    }
    package.package_hash = sha256_hex(serde_json::to_string(&value)?.as_bytes());
    Ok(package)
}

async fn verify_subset(
    store: &dyn AuditStore,
    subset: &[AuditRecord],
) -> Result<(bool, Vec<String>), AuditError> {
    if subset.is_empty() {
        return Ok((true, Vec::new()));
    }
    // Recompute hashes on the subset itself.
    let mut errors = Vec::new();
    for record in subset {
        let recomputed = crate::hashing::record_hash(record)?;
        if recomputed != record.record_hash {
            errors.push(format!(
                "sequence {}: stored hash does not match canonical content",
                record.sequence_number
            ));
        }
    }
    // And verify the tenant chain across the span the subset covers.
    let first = subset.first().map(|r| r.sequence_number).unwrap_or(0);
    let span = store
        .records(&subset[0].tenant_id, Some(first.saturating_sub(1)), None)
        .await?;
    let (ok, span_errors) = verify_chain(&span, first > 0);
    if !ok {
        errors.extend(span_errors);
    }
    Ok((errors.is_empty(), errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryAuditStore;
    use crate::consumer::AuditConsumer;
    use aluskort_persistence::{publish_audit, InMemoryBus, MemoryObjectStore};
    use aluskort_schemas::{
        Actor, ActorType, AuditContext, AuditEventEnvelope, AuditEventType, AuditSeverity,
    };

    async fn seeded_store(investigation_id: Uuid) -> Arc<InMemoryAuditStore> {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryAuditStore::new());
        let consumer = AuditConsumer::new(bus.clone(), store.clone());
        for event_type in [
            AuditEventType::AlertReceived,
            AuditEventType::StateTransition,
            AuditEventType::DecisionClassified,
            AuditEventType::ActionExecuted,
            AuditEventType::ApprovalRequested,
        ] {
            let env = AuditEventEnvelope::new(
                "t1",
                "orchestrator",
                event_type,
                AuditSeverity::Info,
                Actor {
                    actor_type: ActorType::Agent,
                    id: "orchestrator".into(),
                    permissions: vec![],
                },
            )
            .with_investigation(investigation_id)
            .with_context(AuditContext {
                llm: (event_type == AuditEventType::DecisionClassified)
                    .then(|| serde_json::json!({"model": "claude-sonnet-4"})),
                ..Default::default()
            });
            publish_audit(bus.as_ref(), &env).await.unwrap();
        }
        consumer.poll_once().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_package_assembles_and_verifies() {
        let investigation_id = Uuid::new_v4();
        let store = seeded_store(investigation_id).await;

        let package = build_evidence_package(store.as_ref(), "t1", investigation_id, false)
            .await
            .unwrap();
        assert!(package.chain_verified, "errors: {:?}", package.chain_errors);
        assert_eq!(package.records.len(), 5);
        assert_eq!(package.llm_interactions.len(), 1);
        assert_eq!(package.actions.len(), 1);
        assert_eq!(package.approvals.len(), 1);
        assert!(!package.package_hash.is_empty());

        // Ordered by sequence
        let seqs: Vec<i64> = package.records.iter().map(|r| r.sequence_number).collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted);
    }

    #[tokio::test]
    async fn test_package_detects_tamper() {
        let investigation_id = Uuid::new_v4();
        let store = seeded_store(investigation_id).await;
        store.tamper("t1", 2, |r| {
            r.decision = serde_json::json!({"confidence": 0.01});
        });

        let package = build_evidence_package(store.as_ref(), "t1", investigation_id, false)
            .await
            .unwrap();
        assert!(!package.chain_verified);
        assert!(package.chain_errors.iter().any(|e| e.contains("2")));
    }

    #[tokio::test]
    async fn test_package_hash_differs_on_content() {
        let investigation_id = Uuid::new_v4();
        let store = seeded_store(investigation_id).await;
        let a = build_evidence_package(store.as_ref(), "t1", investigation_id, false)
            .await
            .unwrap();
        let b = build_evidence_package(store.as_ref(), "t1", Uuid::new_v4(), false)
            .await
            .unwrap();
        assert_ne!(a.package_hash, b.package_hash);
    }

    #[tokio::test]
    async fn test_evidence_key_layout() {
        let record = crate::hashing::tests::sample_record("t1", 1, crate::hashing::GENESIS_HASH);
        let key = evidence_key(&record, "llm_prompt");
        assert!(key.starts_with("cold/t1/"));
        assert!(key.ends_with(&format!("{}/llm_prompt.json", record.audit_id)));
    }

    #[tokio::test]
    async fn test_offload_threshold_and_fail_open() {
        let objects = Arc::new(MemoryObjectStore::new("evidence"));
        let evidence = EvidenceStore::new(objects.clone());

        let mut record = crate::hashing::tests::sample_record("t1", 1, crate::hashing::GENESIS_HASH);
        record.decision = serde_json::json!({
            "llm_prompt": "x".repeat(10_000),
            "summary": "small, stays inline",
        });
        let refs = evidence.offload(&record).await;
        assert_eq!(refs.len(), 1);
        assert!(refs[0].contains("#sha256="));
        assert_eq!(objects.object_count(), 1);

        record.decision = serde_json::json!({"summary": "tiny"});
        assert!(evidence.offload(&record).await.is_empty());
    }
}
