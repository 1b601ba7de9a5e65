//! Canonical JSON and record hashing.
//!
//! The hash input is the record's canonical JSON with `record_hash` removed:
//! keys sorted, tightest separators, no whitespace. Determinism here is what
//! makes independent verification possible.

use serde::Serialize;
use sha2::{Digest, Sha256};

use aluskort_schemas::AuditRecord;

use crate::error::AuditError;

/// `previous_hash` of every genesis record.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Canonical JSON: sorted keys (serde_json maps are ordered), compact
/// separators. Any serializable value.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, AuditError> {
    // Round-trip through Value so struct field order collapses to key order.
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// SHA-256 over the canonical record minus `record_hash`, lowercase hex.
pub fn record_hash(record: &AuditRecord) -> Result<String, AuditError> {
    let mut value = serde_json::to_value(record)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("record_hash");
    }
    let canonical = serde_json::to_string(&value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
