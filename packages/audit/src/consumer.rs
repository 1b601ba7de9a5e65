//! The single-writer audit consumer.
//!
//! Pulls `audit.events` in bounded batches, assigns chain positions, hashes,
//! inserts, and commits the offset only after the batch is durably written.
//! Tenant ordering is the bus's per-key guarantee; this consumer is deployed
//! as a single replica.

use chrono::Utc;
use std::sync::Arc;

use aluskort_persistence::{topics, MessageBus};
use aluskort_schemas::{
    Actor, ActorType, AuditEventEnvelope, AuditEventType, AuditRecord, AuditSeverity,
    EventCategory,
};

use crate::chain::{AuditStore, ChainHead};
use crate::error::AuditError;
use crate::evidence::EvidenceStore;
use crate::hashing::{record_hash, GENESIS_HASH};

const CONSUMER_GROUP: &str = "audit-service";
const MAX_BATCH: usize = 100;
/// Current record schema version.
const RECORD_VERSION: u16 = 1;

/// The audit event consumer.
pub struct AuditConsumer {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn AuditStore>,
    evidence: Option<Arc<EvidenceStore>>,
}

impl AuditConsumer {
    pub fn new(bus: Arc<dyn MessageBus>, store: Arc<dyn AuditStore>) -> Self {
        Self {
            bus,
            store,
            evidence: None,
        }
    }

    pub fn with_evidence_store(mut self, evidence: Arc<EvidenceStore>) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Consume one bounded batch. Returns the number of records written.
    pub async fn poll_once(&self) -> Result<usize, AuditError> {
        let batch = self
            .bus
            .poll(topics::AUDIT_EVENTS, CONSUMER_GROUP, MAX_BATCH)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        let mut last_offset = 0;
        for message in &batch {
            last_offset = message.offset;
            let envelope = match serde_json::from_slice::<AuditEventEnvelope>(&message.payload)
                .map_err(|e| e.to_string())
                .and_then(|env| env.validate().map(|_| env).map_err(|e| e.to_string()))
            {
                Ok(env) => env,
                Err(error) => {
                    // Contract violation: DLQ and move on, never stall.
                    tracing::warn!(error = %error, "malformed audit envelope, dead-lettering");
                    self.bus
                        .dead_letter(topics::AUDIT_EVENTS, &error, &message.payload)
                        .await?;
                    continue;
                }
            };
            if self.ingest(envelope).await? {
                written += 1;
            }
        }

        // Commit only after every write in the batch landed.
        self.bus
            .commit(topics::AUDIT_EVENTS, CONSUMER_GROUP, last_offset)
            .await?;
        Ok(written)
    }

    /// Run the consume loop until `shutdown` resolves.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("audit consumer draining and stopping");
                        // Final drain so committed work is not stranded.
                        let _ = self.poll_once().await;
                        return;
                    }
                }
                result = self.poll_once() => {
                    match result {
                        Ok(0) => tokio::time::sleep(std::time::Duration::from_millis(250)).await,
                        Ok(n) => tracing::debug!(records = n, "audit batch written"),
                        Err(e) => {
                            tracing::error!(error = %e, "audit batch failed, backing off");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    /// Chain one envelope. Returns false when the record was a duplicate.
    async fn ingest(&self, envelope: AuditEventEnvelope) -> Result<bool, AuditError> {
        let head = self.ensure_head(&envelope.tenant_id).await?;

        let mut record = AuditRecord {
            audit_id: envelope.audit_id,
            tenant_id: envelope.tenant_id.clone(),
            sequence_number: head.last_sequence + 1,
            previous_hash: head.last_hash.clone(),
            timestamp: envelope.timestamp,
            ingested_at: Utc::now(),
            event_type: envelope.event_type,
            event_category: envelope.event_type.category(),
            severity: envelope.severity,
            actor: envelope.actor,
            investigation_id: envelope.investigation_id,
            alert_id: envelope.alert_id,
            entity_ids: envelope.entity_ids,
            context: envelope.context,
            decision: envelope.decision,
            outcome: envelope.outcome,
            evidence_refs: Vec::new(),
            record_hash: String::new(),
            record_version: RECORD_VERSION,
        };

        // Large artifacts move to cold storage first so their refs are part
        // of the hashed record. Failures are fail-open: refs stay empty.
        if let Some(evidence) = &self.evidence {
            record.evidence_refs = evidence.offload(&record).await;
        }

        record.record_hash = record_hash(&record)?;

        if !self.store.insert(&record).await? {
            tracing::debug!(
                tenant_id = %record.tenant_id,
                sequence = record.sequence_number,
                "duplicate audit record suppressed"
            );
            return Ok(false);
        }
        self.store
            .upsert_head(&ChainHead {
                tenant_id: record.tenant_id.clone(),
                last_sequence: record.sequence_number,
                last_hash: record.record_hash.clone(),
                updated_at: record.ingested_at,
            })
            .await?;
        Ok(true)
    }

    /// Fetch the chain head, writing the genesis record when none exists.
    async fn ensure_head(&self, tenant_id: &str) -> Result<ChainHead, AuditError> {
        if let Some(head) = self.store.head(tenant_id).await? {
            return Ok(head);
        }

        let now = Utc::now();
        let mut genesis = AuditRecord {
            audit_id: uuid::Uuid::now_v7(),
            tenant_id: tenant_id.to_string(),
            sequence_number: 0,
            previous_hash: GENESIS_HASH.to_string(),
            timestamp: now,
            ingested_at: now,
            event_type: AuditEventType::Genesis,
            event_category: EventCategory::System,
            severity: AuditSeverity::Info,
            actor: Actor {
                actor_type: ActorType::System,
                id: "audit-service".into(),
                permissions: vec![],
            },
            investigation_id: None,
            alert_id: None,
            entity_ids: vec![],
            context: Default::default(),
            decision: serde_json::Value::Null,
            outcome: serde_json::Value::Null,
            evidence_refs: vec![],
            record_hash: String::new(),
            record_version: RECORD_VERSION,
        };
        genesis.record_hash = record_hash(&genesis)?;
        self.store.insert(&genesis).await?;

        let head = ChainHead {
            tenant_id: tenant_id.to_string(),
            last_sequence: 0,
            last_hash: genesis.record_hash,
            updated_at: now,
        };
        self.store.upsert_head(&head).await?;
        tracing::info!(tenant_id = %tenant_id, "genesis record created");
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryAuditStore;
    use aluskort_persistence::{publish_audit, InMemoryBus};

    fn envelope(tenant: &str) -> AuditEventEnvelope {
        AuditEventEnvelope::new(
            tenant,
            "orchestrator",
            AuditEventType::AlertReceived,
            AuditSeverity::Info,
            Actor {
                actor_type: ActorType::Agent,
                id: "orchestrator".into(),
                permissions: vec![],
            },
        )
    }

    fn consumer() -> (AuditConsumer, Arc<InMemoryBus>, Arc<InMemoryAuditStore>) {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryAuditStore::new());
        (
            AuditConsumer::new(bus.clone(), store.clone()),
            bus,
            store,
        )
    }

    #[tokio::test]
    async fn test_genesis_then_chain() {
        let (consumer, bus, store) = consumer();
        publish_audit(bus.as_ref(), &envelope("t1")).await.unwrap();
        publish_audit(bus.as_ref(), &envelope("t1")).await.unwrap();

        consumer.poll_once().await.unwrap();

        let records = store.records("t1", None, None).await.unwrap();
        assert_eq!(records.len(), 3, "genesis + 2 events");
        assert_eq!(records[0].sequence_number, 0);
        assert_eq!(records[0].event_type, AuditEventType::Genesis);
        assert_eq!(records[0].previous_hash, GENESIS_HASH);
        assert_eq!(records[1].previous_hash, records[0].record_hash);
        assert_eq!(records[2].previous_hash, records[1].record_hash);
    }

    #[tokio::test]
    async fn test_interleaved_tenants_have_independent_chains() {
        let (consumer, bus, store) = consumer();
        for _ in 0..50 {
            publish_audit(bus.as_ref(), &envelope("tenant-a")).await.unwrap();
            publish_audit(bus.as_ref(), &envelope("tenant-b")).await.unwrap();
        }
        while consumer.poll_once().await.unwrap() > 0 {}

        for tenant in ["tenant-a", "tenant-b"] {
            let records = store.records(tenant, None, None).await.unwrap();
            assert_eq!(records.len(), 51, "{tenant}: genesis + 50");
            let seqs: Vec<i64> = records.iter().map(|r| r.sequence_number).collect();
            let expected: Vec<i64> = (0..=50).collect();
            assert_eq!(seqs, expected, "{tenant}: contiguous sequence");
            for pair in records.windows(2) {
                assert_eq!(pair[1].previous_hash, pair[0].record_hash);
            }
        }

        // No cross-tenant hash references
        let a_hashes: std::collections::HashSet<String> = store
            .records("tenant-a", None, None)
            .await
            .unwrap()
            .iter()
            .map(|r| r.record_hash.clone())
            .collect();
        let b = store.records("tenant-b", None, None).await.unwrap();
        assert!(b.iter().all(|r| !a_hashes.contains(&r.previous_hash)));
    }

    #[tokio::test]
    async fn test_malformed_envelope_goes_to_dlq() {
        let (consumer, bus, store) = consumer();
        bus.publish(topics::AUDIT_EVENTS, "t1", b"{not valid json".to_vec())
            .await
            .unwrap();
        publish_audit(bus.as_ref(), &envelope("t1")).await.unwrap();

        let written = consumer.poll_once().await.unwrap();
        assert_eq!(written, 1, "good message still lands");
        assert_eq!(bus.len(&topics::dlq(topics::AUDIT_EVENTS)), 1);
        assert_eq!(store.records("t1", None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_event_type_rejected_to_dlq() {
        let (consumer, bus, _store) = consumer();
        let raw = serde_json::json!({
            "audit_id": uuid::Uuid::now_v7(),
            "tenant_id": "t1",
            "timestamp": Utc::now(),
            "source_service": "rogue",
            "event_type": "made.up_event",
            "severity": "info",
            "actor": {"type": "system", "id": "x", "permissions": []},
            "decision": null,
            "outcome": null
        });
        bus.publish(topics::AUDIT_EVENTS, "t1", serde_json::to_vec(&raw).unwrap())
            .await
            .unwrap();
        let written = consumer.poll_once().await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(bus.len(&topics::dlq(topics::AUDIT_EVENTS)), 1);
    }

    #[tokio::test]
    async fn test_offset_committed_after_batch() {
        let (consumer, bus, store) = consumer();
        publish_audit(bus.as_ref(), &envelope("t1")).await.unwrap();
        consumer.poll_once().await.unwrap();
        // Nothing new: a second poll writes nothing (no reprocessing).
        assert_eq!(consumer.poll_once().await.unwrap(), 0);
        assert_eq!(store.records("t1", None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_hash_verifies() {
        let (consumer, bus, store) = consumer();
        publish_audit(bus.as_ref(), &envelope("t1")).await.unwrap();
        consumer.poll_once().await.unwrap();
        for record in store.records("t1", None, None).await.unwrap() {
            assert_eq!(record_hash(&record).unwrap(), record.record_hash);
        }
    }
}
