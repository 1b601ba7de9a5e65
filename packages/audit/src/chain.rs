//! Chain heads and the audit store seam.
//!
//! The store is append-only: the trait offers insert and read, never update
//! or delete. The in-memory implementation backs tests and enforces the same
//! uniqueness and append-only rules the Postgres schema does with its
//! constraints and trigger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use aluskort_schemas::AuditRecord;

use crate::error::AuditError;

/// Per-tenant chain head, shared between the consumer and verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainHead {
    pub tenant_id: String,
    pub last_sequence: i64,
    pub last_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// A verification log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationLogRow {
    pub tenant_id: String,
    pub check_type: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub records_checked: usize,
    pub duration_seconds: f64,
    pub ran_at: DateTime<Utc>,
}

/// The audit store seam. No update, no delete.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn head(&self, tenant_id: &str) -> Result<Option<ChainHead>, AuditError>;

    /// Insert one record. Returns `false` when `(tenant_id, sequence_number)`
    /// already exists (at-least-once duplicate suppression).
    async fn insert(&self, record: &AuditRecord) -> Result<bool, AuditError>;

    async fn upsert_head(&self, head: &ChainHead) -> Result<(), AuditError>;

    /// Records for a tenant ordered by sequence, optionally bounded.
    async fn records(
        &self,
        tenant_id: &str,
        from_sequence: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, AuditError>;

    /// Last N records for a tenant, ordered by sequence.
    async fn tail(&self, tenant_id: &str, n: usize) -> Result<Vec<AuditRecord>, AuditError>;

    async fn by_audit_id(&self, audit_id: uuid::Uuid) -> Result<Option<AuditRecord>, AuditError>;

    async fn by_investigation(
        &self,
        tenant_id: &str,
        investigation_id: uuid::Uuid,
    ) -> Result<Vec<AuditRecord>, AuditError>;

    async fn tenants(&self) -> Result<Vec<String>, AuditError>;

    async fn log_verification(&self, row: &VerificationLogRow) -> Result<(), AuditError>;
}

#[derive(Default)]
struct MemoryInner {
    // (tenant, sequence) -> record
    records: HashMap<(String, i64), AuditRecord>,
    heads: HashMap<String, ChainHead>,
    verification_log: Vec<VerificationLogRow>,
}

/// In-memory audit store with the same contract as the Postgres binding.
#[derive(Default, Clone)]
pub struct InMemoryAuditStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// TAMPERING HELPER - tests only. Mutates a stored record the way a
    /// hostile DBA would, bypassing the append-only contract.
    pub fn tamper(&self, tenant_id: &str, sequence: i64, mutate: impl FnOnce(&mut AuditRecord)) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.records.get_mut(&(tenant_id.to_string(), sequence)) {
            mutate(record);
        }
    }

    pub fn verification_log(&self) -> Vec<VerificationLogRow> {
        self.inner.lock().verification_log.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn head(&self, tenant_id: &str) -> Result<Option<ChainHead>, AuditError> {
        Ok(self.inner.lock().heads.get(tenant_id).cloned())
    }

    async fn insert(&self, record: &AuditRecord) -> Result<bool, AuditError> {
        let mut inner = self.inner.lock();
        let key = (record.tenant_id.clone(), record.sequence_number);
        if inner.records.contains_key(&key) {
            return Ok(false);
        }
        inner.records.insert(key, record.clone());
        Ok(true)
    }

    async fn upsert_head(&self, head: &ChainHead) -> Result<(), AuditError> {
        self.inner
            .lock()
            .heads
            .insert(head.tenant_id.clone(), head.clone());
        Ok(())
    }

    async fn records(
        &self,
        tenant_id: &str,
        from_sequence: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let inner = self.inner.lock();
        let mut records: Vec<AuditRecord> = inner
            .records
            .iter()
            .filter(|((t, seq), _)| t == tenant_id && from_sequence.is_none_or(|f| *seq >= f))
            .map(|(_, r)| r.clone())
            .collect();
        records.sort_by_key(|r| r.sequence_number);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn tail(&self, tenant_id: &str, n: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records = self.records(tenant_id, None, None).await?;
        let skip = records.len().saturating_sub(n);
        records.drain(..skip);
        Ok(records)
    }

    async fn by_audit_id(&self, audit_id: uuid::Uuid) -> Result<Option<AuditRecord>, AuditError> {
        Ok(self
            .inner
            .lock()
            .records
            .values()
            .find(|r| r.audit_id == audit_id)
            .cloned())
    }

    async fn by_investigation(
        &self,
        tenant_id: &str,
        investigation_id: uuid::Uuid,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records: Vec<AuditRecord> = self
            .inner
            .lock()
            .records
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.investigation_id == Some(investigation_id))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.sequence_number);
        Ok(records)
    }

    async fn tenants(&self) -> Result<Vec<String>, AuditError> {
        let inner = self.inner.lock();
        let mut tenants: Vec<String> = inner.heads.keys().cloned().collect();
        tenants.sort();
        Ok(tenants)
    }

    async fn log_verification(&self, row: &VerificationLogRow) -> Result<(), AuditError> {
        self.inner.lock().verification_log.push(row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::GENESIS_HASH;
    use aluskort_schemas::{Actor, ActorType, AuditEventType, AuditSeverity, EventCategory};

    fn record(tenant: &str, seq: i64) -> AuditRecord {
        AuditRecord {
            audit_id: uuid::Uuid::now_v7(),
            tenant_id: tenant.into(),
            sequence_number: seq,
            previous_hash: GENESIS_HASH.into(),
            timestamp: Utc::now(),
            ingested_at: Utc::now(),
            event_type: AuditEventType::AlertReceived,
            event_category: EventCategory::Decision,
            severity: AuditSeverity::Info,
            actor: Actor {
                actor_type: ActorType::System,
                id: "test".into(),
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
            record_version: 1,
        }
    }

    #[tokio::test]
    async fn test_duplicate_sequence_suppressed() {
        let store = InMemoryAuditStore::new();
        assert!(store.insert(&record("t1", 0)).await.unwrap());
        assert!(!store.insert(&record("t1", 0)).await.unwrap());
        assert!(store.insert(&record("t2", 0)).await.unwrap(), "other tenants unaffected");
    }

    #[tokio::test]
    async fn test_records_ordered_by_sequence() {
        let store = InMemoryAuditStore::new();
        for seq in [2, 0, 1] {
            store.insert(&record("t1", seq)).await.unwrap();
        }
        let records = store.records("t1", None, None).await.unwrap();
        let seqs: Vec<i64> = records.iter().map(|r| r.sequence_number).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_tail() {
        let store = InMemoryAuditStore::new();
        for seq in 0..10 {
            store.insert(&record("t1", seq)).await.unwrap();
        }
        let tail = store.tail("t1", 3).await.unwrap();
        let seqs: Vec<i64> = tail.iter().map(|r| r.sequence_number).collect();
        assert_eq!(seqs, vec![7, 8, 9]);
    }
}
