//! Monthly retention: export a cooled partition to Parquet in cold storage,
//! verify, then drop the warm partition - and only then.
//!
//! The drop is gated three ways: the export verified, no record in the
//! partition belongs to a legal-hold tenant, and at least one month of
//! warm buffer remains. Cold lifecycle transitions (365/730 days, 2555-day
//! expiry) are bucket policy, recorded here as constants for the operator.

use chrono::{DateTime, Datelike, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

use aluskort_persistence::ObjectStore;
use aluskort_schemas::AuditRecord;

use crate::chain::AuditStore;
use crate::error::AuditError;

/// Cold lifecycle policy (days), applied as bucket configuration.
pub const LIFECYCLE_INFREQUENT_ACCESS_DAYS: u32 = 365;
pub const LIFECYCLE_ARCHIVE_DAYS: u32 = 730;
pub const LIFECYCLE_EXPIRY_DAYS: u32 = 2555;

/// What one retention run did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionOutcome {
    pub tenant_id: String,
    pub partition: String,
    pub rows_exported: usize,
    pub export_verified: bool,
    pub partition_dropped: bool,
    pub skip_reason: Option<String>,
}

/// The monthly retention job.
pub struct RetentionJob {
    store: Arc<dyn AuditStore>,
    objects: Arc<dyn ObjectStore>,
    legal_hold_tenants: HashSet<String>,
}

/// `cold/{tenant}/{YYYY-MM}/audit_records.parquet`
fn parquet_key(tenant_id: &str, partition: &str) -> String {
    format!("cold/{tenant_id}/{partition}/audit_records.parquet")
}

/// The month to cool: two months before `now`.
pub fn partition_to_cool(now: DateTime<Utc>) -> String {
    let (year, month) = if now.month() <= 2 {
        (now.year() - 1, now.month() + 10)
    } else {
        (now.year(), now.month() - 2)
    };
    format!("{year:04}-{month:02}")
}

fn records_to_dataframe(records: &[AuditRecord]) -> Result<DataFrame, AuditError> {
    let to_col = |f: &dyn Fn(&AuditRecord) -> String| -> Vec<String> {
        records.iter().map(f).collect()
    };
    let df = df! {
        "audit_id" => to_col(&|r| r.audit_id.to_string()),
        "tenant_id" => to_col(&|r| r.tenant_id.clone()),
        "sequence_number" => records.iter().map(|r| r.sequence_number).collect::<Vec<i64>>(),
        "previous_hash" => to_col(&|r| r.previous_hash.clone()),
        "record_hash" => to_col(&|r| r.record_hash.clone()),
        "timestamp" => to_col(&|r| r.timestamp.to_rfc3339()),
        "event_type" => to_col(&|r| r.event_type.as_str().to_string()),
        "record" => records
            .iter()
            .map(|r| serde_json::to_string(r).unwrap_or_default())
            .collect::<Vec<String>>(),
    }
    .map_err(|e| AuditError::Export(e.to_string()))?;
    Ok(df)
}

impl RetentionJob {
    pub fn new(store: Arc<dyn AuditStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            objects,
            legal_hold_tenants: HashSet::new(),
        }
    }

    pub fn with_legal_hold(mut self, tenants: &[&str]) -> Self {
        self.legal_hold_tenants = tenants.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Run retention for one tenant. `drop_partition` is a callback into the
    /// operator's partition management; it is only invoked when every gate
    /// passes.
    pub async fn run_for_tenant(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        warm_months_available: u32,
        drop_partition: impl FnOnce(&str) -> bool,
    ) -> Result<RetentionOutcome, AuditError> {
        let partition = partition_to_cool(now);
        let records = self.partition_records(tenant_id, &partition).await?;

        if records.is_empty() {
            return Ok(RetentionOutcome {
                tenant_id: tenant_id.to_string(),
                partition,
                rows_exported: 0,
                export_verified: false,
                partition_dropped: false,
                skip_reason: Some("partition empty".into()),
            });
        }

        // Export to Parquet with a SHA-256 sidecar.
        let mut df = records_to_dataframe(&records)?;
        let mut buffer = Vec::new();
        ParquetWriter::new(&mut buffer)
            .finish(&mut df)
            .map_err(|e| AuditError::Export(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&buffer);
        let parquet_hash = format!("{:x}", hasher.finalize());

        let key = parquet_key(tenant_id, &partition);
        self.objects.put(&key, buffer.clone()).await?;
        self.objects
            .put(&format!("{key}.sha256"), parquet_hash.clone().into_bytes())
            .await?;

        // Verify: read back and compare hashes.
        let readback = self.objects.get(&key).await?;
        let mut verify_hasher = Sha256::new();
        verify_hasher.update(&readback);
        let export_verified = format!("{:x}", verify_hasher.finalize()) == parquet_hash;

        // Drop gates.
        let mut skip_reason = None;
        if !export_verified {
            skip_reason = Some("export verification failed".into());
        } else if self.legal_hold_tenants.contains(tenant_id) {
            skip_reason = Some("tenant under legal hold".into());
        } else if warm_months_available <= 1 {
            skip_reason = Some("one-month warm buffer required".into());
        }

        let partition_dropped = if skip_reason.is_none() {
            drop_partition(&partition)
        } else {
            false
        };

        Ok(RetentionOutcome {
            tenant_id: tenant_id.to_string(),
            partition,
            rows_exported: records.len(),
            export_verified,
            partition_dropped,
            skip_reason,
        })
    }

    async fn partition_records(
        &self,
        tenant_id: &str,
        partition: &str,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let all = self.store.records(tenant_id, None, None).await?;
        Ok(all
            .into_iter()
            .filter(|r| format!("{:04}-{:02}", r.timestamp.year(), r.timestamp.month()) == partition)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryAuditStore;
    use crate::hashing::{record_hash, GENESIS_HASH};
    use aluskort_persistence::MemoryObjectStore;
    use chrono::TimeZone;

    fn record_at(tenant: &str, seq: i64, timestamp: DateTime<Utc>) -> AuditRecord {
        let mut record = crate::hashing::tests::sample_record(tenant, seq, GENESIS_HASH);
        record.timestamp = timestamp;
        record.record_hash = record_hash(&record).unwrap();
        record
    }

    async fn seeded(now: DateTime<Utc>) -> (Arc<InMemoryAuditStore>, Arc<MemoryObjectStore>) {
        let store = Arc::new(InMemoryAuditStore::new());
        let objects = Arc::new(MemoryObjectStore::new("audit-cold"));
        let cooled = Utc
            .with_ymd_and_hms(now.year(), now.month(), 15, 12, 0, 0)
            .unwrap()
            - chrono::Duration::days(61);
        for seq in 0..5 {
            store.insert(&record_at("t1", seq, cooled)).await.unwrap();
        }
        (store, objects)
    }

    #[test]
    fn test_partition_selection() {
        let now = Utc.with_ymd_and_hms(2026, 7, 10, 0, 0, 0).unwrap();
        assert_eq!(partition_to_cool(now), "2026-05");
        let january = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(partition_to_cool(january), "2025-11");
    }

    #[tokio::test]
    async fn test_export_verify_and_drop() {
        let now = Utc.with_ymd_and_hms(2026, 7, 10, 0, 0, 0).unwrap();
        let (store, objects) = seeded(now).await;
        let job = RetentionJob::new(store, objects.clone());

        let mut dropped = None;
        let outcome = job
            .run_for_tenant("t1", now, 3, |p| {
                dropped = Some(p.to_string());
                true
            })
            .await
            .unwrap();

        assert_eq!(outcome.rows_exported, 5);
        assert!(outcome.export_verified);
        assert!(outcome.partition_dropped);
        assert_eq!(dropped.as_deref(), Some("2026-05"));
        // Parquet + sidecar landed
        let keys = objects.list("cold/t1/2026-05/").await.unwrap();
        assert!(keys.contains(&"cold/t1/2026-05/audit_records.parquet".to_string()));
        assert!(keys.contains(&"cold/t1/2026-05/audit_records.parquet.sha256".to_string()));
    }

    #[tokio::test]
    async fn test_legal_hold_blocks_drop_but_not_export() {
        let now = Utc.with_ymd_and_hms(2026, 7, 10, 0, 0, 0).unwrap();
        let (store, objects) = seeded(now).await;
        let job = RetentionJob::new(store, objects).with_legal_hold(&["t1"]);

        let outcome = job.run_for_tenant("t1", now, 3, |_| true).await.unwrap();
        assert!(outcome.export_verified);
        assert!(!outcome.partition_dropped);
        assert_eq!(outcome.skip_reason.as_deref(), Some("tenant under legal hold"));
    }

    #[tokio::test]
    async fn test_warm_buffer_blocks_drop() {
        let now = Utc.with_ymd_and_hms(2026, 7, 10, 0, 0, 0).unwrap();
        let (store, objects) = seeded(now).await;
        let job = RetentionJob::new(store, objects);

        let outcome = job.run_for_tenant("t1", now, 1, |_| true).await.unwrap();
        assert!(!outcome.partition_dropped);
        assert_eq!(
            outcome.skip_reason.as_deref(),
            Some("one-month warm buffer required")
        );
    }

    #[tokio::test]
    async fn test_empty_partition_skipped() {
        let now = Utc.with_ymd_and_hms(2026, 7, 10, 0, 0, 0).unwrap();
        let store = Arc::new(InMemoryAuditStore::new());
        let objects = Arc::new(MemoryObjectStore::new("audit-cold"));
        let job = RetentionJob::new(store, objects);
        let outcome = job.run_for_tenant("t1", now, 3, |_| true).await.unwrap();
        assert_eq!(outcome.rows_exported, 0);
        assert!(!outcome.partition_dropped);
    }

    #[test]
    fn test_lifecycle_constants() {
        assert_eq!(LIFECYCLE_INFREQUENT_ACCESS_DAYS, 365);
        assert_eq!(LIFECYCLE_ARCHIVE_DAYS, 730);
        assert_eq!(LIFECYCLE_EXPIRY_DAYS, 2555);
    }
}
