//! Postgres binding and the schema obligations the core owns.
//!
//! The records table is partitioned monthly on `timestamp`; the primary key
//! includes the partition column as Postgres requires. An append-only
//! trigger raises on UPDATE and DELETE - tamper attempts fail at the store,
//! not in application code.

use async_trait::async_trait;
use sqlx::Row;

use aluskort_persistence::DbClient;
use aluskort_schemas::AuditRecord;

use crate::chain::{AuditStore, ChainHead, VerificationLogRow};
use crate::error::AuditError;

/// Schema obligations, applied by the operator's migration tooling.
pub const DDL_AUDIT_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS audit_records (
    audit_id UUID NOT NULL,
    tenant_id TEXT NOT NULL,
    sequence_number BIGINT NOT NULL,
    previous_hash CHAR(64) NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    ingested_at TIMESTAMPTZ NOT NULL,
    event_type TEXT NOT NULL,
    event_category TEXT NOT NULL,
    severity TEXT NOT NULL,
    actor JSONB NOT NULL,
    investigation_id UUID,
    alert_id TEXT,
    entity_ids TEXT[] NOT NULL DEFAULT '{}',
    context JSONB NOT NULL DEFAULT '{}',
    decision JSONB,
    outcome JSONB,
    evidence_refs TEXT[] NOT NULL DEFAULT '{}',
    record_hash CHAR(64) NOT NULL,
    record_version SMALLINT NOT NULL,
    PRIMARY KEY (tenant_id, sequence_number, timestamp)
) PARTITION BY RANGE (timestamp);
"#;

pub const DDL_AUDIT_INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS audit_records_tenant_seq
    ON audit_records (tenant_id, sequence_number, timestamp);
CREATE INDEX IF NOT EXISTS audit_records_tenant_time
    ON audit_records (tenant_id, timestamp DESC);
CREATE INDEX IF NOT EXISTS audit_records_investigation
    ON audit_records (investigation_id, timestamp);
CREATE INDEX IF NOT EXISTS audit_records_alert
    ON audit_records (alert_id, timestamp);
CREATE INDEX IF NOT EXISTS audit_records_event_type
    ON audit_records (event_type, timestamp);
CREATE INDEX IF NOT EXISTS audit_records_event_category
    ON audit_records (event_category, timestamp);
CREATE INDEX IF NOT EXISTS audit_records_actor
    ON audit_records ((actor->>'id'), timestamp);
CREATE INDEX IF NOT EXISTS audit_records_severity
    ON audit_records (severity, timestamp)
    WHERE severity IN ('warning', 'critical');
"#;

pub const DDL_APPEND_ONLY_TRIGGER: &str = r#"
CREATE OR REPLACE FUNCTION audit_records_append_only() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'audit_records is append-only (% blocked)', TG_OP;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS audit_records_no_rewrite ON audit_records;
CREATE TRIGGER audit_records_no_rewrite
    BEFORE UPDATE OR DELETE ON audit_records
    FOR EACH ROW EXECUTE FUNCTION audit_records_append_only();
"#;

pub const DDL_CHAIN_STATE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_chain_state (
    tenant_id TEXT PRIMARY KEY,
    last_sequence BIGINT NOT NULL,
    last_hash CHAR(64) NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
"#;

pub const DDL_VERIFICATION_LOG: &str = r#"
CREATE TABLE IF NOT EXISTS audit_verification_log (
    id BIGSERIAL PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    check_type TEXT NOT NULL,
    valid BOOLEAN NOT NULL,
    errors JSONB NOT NULL DEFAULT '[]',
    records_checked INTEGER NOT NULL,
    duration_seconds DOUBLE PRECISION NOT NULL,
    ran_at TIMESTAMPTZ NOT NULL
);
"#;

/// Postgres audit store. Writes hold a row lock on the chain head so the
/// consumer and verification reads do not race.
pub struct PgAuditStore {
    db: DbClient,
}

impl PgAuditStore {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<AuditRecord, AuditError> {
        let payload: serde_json::Value = row.try_get("record").map_err(|e| {
            AuditError::Store(aluskort_persistence::StoreError::Database(e))
        })?;
        Ok(serde_json::from_value(payload)?)
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn head(&self, tenant_id: &str) -> Result<Option<ChainHead>, AuditError> {
        let row = sqlx::query(
            "SELECT tenant_id, last_sequence, last_hash, updated_at
             FROM audit_chain_state WHERE tenant_id = $1 FOR UPDATE",
        )
        .bind(tenant_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(aluskort_persistence::StoreError::Database)?;
        Ok(row.map(|r| ChainHead {
            tenant_id: r.get("tenant_id"),
            last_sequence: r.get("last_sequence"),
            last_hash: {
                let h: String = r.get("last_hash");
                h.trim().to_string()
            },
            updated_at: r.get("updated_at"),
        }))
    }

    async fn insert(&self, record: &AuditRecord) -> Result<bool, AuditError> {
        let result = sqlx::query(
            "INSERT INTO audit_records (
                audit_id, tenant_id, sequence_number, previous_hash, timestamp,
                ingested_at, event_type, event_category, severity, actor,
                investigation_id, alert_id, entity_ids, context, decision,
                outcome, evidence_refs, record_hash, record_version
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            ON CONFLICT (tenant_id, sequence_number, timestamp) DO NOTHING",
        )
        .bind(record.audit_id)
        .bind(&record.tenant_id)
        .bind(record.sequence_number)
        .bind(&record.previous_hash)
        .bind(record.timestamp)
        .bind(record.ingested_at)
        .bind(record.event_type.as_str())
        .bind(serde_json::to_string(&record.event_category)?.trim_matches('"').to_string())
        .bind(serde_json::to_string(&record.severity)?.trim_matches('"').to_string())
        .bind(serde_json::to_value(&record.actor)?)
        .bind(record.investigation_id)
        .bind(&record.alert_id)
        .bind(&record.entity_ids)
        .bind(serde_json::to_value(&record.context)?)
        .bind(&record.decision)
        .bind(&record.outcome)
        .bind(&record.evidence_refs)
        .bind(&record.record_hash)
        .bind(record.record_version as i16)
        .execute(self.db.pool())
        .await
        .map_err(aluskort_persistence::StoreError::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn upsert_head(&self, head: &ChainHead) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO audit_chain_state (tenant_id, last_sequence, last_hash, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant_id) DO UPDATE
             SET last_sequence = EXCLUDED.last_sequence,
                 last_hash = EXCLUDED.last_hash,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&head.tenant_id)
        .bind(head.last_sequence)
        .bind(&head.last_hash)
        .bind(head.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(aluskort_persistence::StoreError::Database)?;
        Ok(())
    }

    async fn records(
        &self,
        tenant_id: &str,
        from_sequence: Option<i64>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let rows = sqlx::query(
            "SELECT row_to_json(audit_records)::jsonb AS record
             FROM audit_records
             WHERE tenant_id = $1 AND sequence_number >= $2
             ORDER BY sequence_number
             LIMIT $3",
        )
        .bind(tenant_id)
        .bind(from_sequence.unwrap_or(0))
        .bind(limit.map(|l| l as i64).unwrap_or(i64::MAX))
        .fetch_all(self.db.pool())
        .await
        .map_err(aluskort_persistence::StoreError::Database)?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn tail(&self, tenant_id: &str, n: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let rows = sqlx::query(
            "SELECT record FROM (
                 SELECT row_to_json(audit_records)::jsonb AS record, sequence_number
                 FROM audit_records
                 WHERE tenant_id = $1
                 ORDER BY sequence_number DESC
                 LIMIT $2
             ) sub ORDER BY sequence_number",
        )
        .bind(tenant_id)
        .bind(n as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(aluskort_persistence::StoreError::Database)?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn by_audit_id(&self, audit_id: uuid::Uuid) -> Result<Option<AuditRecord>, AuditError> {
        let row = sqlx::query(
            "SELECT row_to_json(audit_records)::jsonb AS record
             FROM audit_records WHERE audit_id = $1",
        )
        .bind(audit_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(aluskort_persistence::StoreError::Database)?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn by_investigation(
        &self,
        tenant_id: &str,
        investigation_id: uuid::Uuid,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let rows = sqlx::query(
            "SELECT row_to_json(audit_records)::jsonb AS record
             FROM audit_records
             WHERE tenant_id = $1 AND investigation_id = $2
             ORDER BY sequence_number",
        )
        .bind(tenant_id)
        .bind(investigation_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(aluskort_persistence::StoreError::Database)?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn tenants(&self) -> Result<Vec<String>, AuditError> {
        let rows = sqlx::query("SELECT tenant_id FROM audit_chain_state ORDER BY tenant_id")
            .fetch_all(self.db.pool())
            .await
            .map_err(aluskort_persistence::StoreError::Database)?;
        Ok(rows.iter().map(|r| r.get("tenant_id")).collect())
    }

    async fn log_verification(&self, row: &VerificationLogRow) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO audit_verification_log
                 (tenant_id, check_type, valid, errors, records_checked, duration_seconds, ran_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&row.tenant_id)
        .bind(&row.check_type)
        .bind(row.valid)
        .bind(serde_json::to_value(&row.errors)?)
        .bind(row.records_checked as i32)
        .bind(row.duration_seconds)
        .bind(row.ran_at)
        .execute(self.db.pool())
        .await
        .map_err(aluskort_persistence::StoreError::Database)?;
        Ok(())
    }
}
