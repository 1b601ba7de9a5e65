//! Message bus seam.
//!
//! The platform assumes a durable partitioned bus with per-key ordering
//! (tenant-keyed where ordering matters). The trait below is what services
//! program against; `InMemoryBus` backs tests and single-node runs with the
//! same ordering guarantees.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StoreError;

/// Closed topic names.
pub mod topics {
    pub const ALERTS_RAW: &str = "alerts.raw";
    pub const ALERTS_NORMALIZED: &str = "alerts.normalized";
    pub const INCIDENTS_ENRICHED: &str = "incidents.enriched";
    pub const ALERTS_CRITICAL: &str = "alerts.priority.critical";
    pub const ALERTS_HIGH: &str = "alerts.priority.high";
    pub const ALERTS_NORMAL: &str = "alerts.priority.normal";
    pub const ALERTS_LOW: &str = "alerts.priority.low";
    pub const CTEM_NORMALIZED: &str = "ctem.normalized";
    pub const ACTIONS_PENDING: &str = "actions.pending";
    pub const AUDIT_EVENTS: &str = "audit.events";

    /// CTEM vendor ingest topics.
    pub const CTEM_VENDORS: &[&str] = &[
        "ctem.raw.wiz",
        "ctem.raw.snyk",
        "ctem.raw.garak",
        "ctem.raw.art",
        "ctem.raw.burp",
        "ctem.raw.custom",
    ];

    /// Dead-letter topic for a given input topic.
    pub fn dlq(topic: &str) -> String {
        format!("{topic}.dlq")
    }
}

/// A consumed bus message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    /// Partition key; `tenant_id` on ordered topics
    pub key: String,
    pub payload: Vec<u8>,
    pub offset: u64,
}

/// Error envelope wrapped around a DLQ'd payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    pub original_topic: String,
    pub error: String,
    pub payload: String,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a keyed message. Per-key ordering is preserved by the bus.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), StoreError>;

    /// Pull up to `max` messages past the committed offset for `topic`.
    async fn poll(&self, topic: &str, group: &str, max: usize) -> Result<Vec<BusMessage>, StoreError>;

    /// Commit consumption up to and including `offset`.
    async fn commit(&self, topic: &str, group: &str, offset: u64) -> Result<(), StoreError>;

    /// Highest offset written to `topic`, for lag computation.
    async fn high_watermark(&self, topic: &str) -> Result<u64, StoreError>;

    /// Route a malformed payload to the topic's DLQ with an error envelope.
    async fn dead_letter(&self, topic: &str, error: &str, payload: &[u8]) -> Result<(), StoreError> {
        let envelope = DlqEnvelope {
            original_topic: topic.to_string(),
            error: error.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        };
        let bytes = serde_json::to_vec(&envelope)?;
        self.publish(&topics::dlq(topic), "dlq", bytes).await
    }
}

/// Validate and publish an audit envelope to `audit.events`, keyed by tenant
/// so per-tenant ordering survives partitioning.
pub async fn publish_audit(
    bus: &dyn MessageBus,
    envelope: &aluskort_schemas::AuditEventEnvelope,
) -> Result<(), StoreError> {
    envelope
        .validate()
        .map_err(|e| StoreError::Validation(e.to_string()))?;
    let payload = serde_json::to_vec(envelope)?;
    bus.publish(topics::AUDIT_EVENTS, &envelope.tenant_id, payload)
        .await
}

#[derive(Default)]
struct TopicLog {
    messages: Vec<(String, Vec<u8>)>,
    committed: HashMap<String, u64>,
}

/// In-memory bus with per-topic append logs. Single partition per topic, so
/// per-key ordering holds trivially.
#[derive(Default, Clone)]
pub struct InMemoryBus {
    inner: Arc<Mutex<HashMap<String, TopicLog>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages on a topic (test helper).
    pub fn len(&self, topic: &str) -> usize {
        self.inner.lock().get(topic).map_or(0, |l| l.messages.len())
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let log = inner.entry(topic.to_string()).or_default();
        log.messages.push((key.to_string(), payload));
        Ok(())
    }

    async fn poll(&self, topic: &str, group: &str, max: usize) -> Result<Vec<BusMessage>, StoreError> {
        let inner = self.inner.lock();
        let Some(log) = inner.get(topic) else {
            return Ok(Vec::new());
        };
        let start = log.committed.get(group).map_or(0, |o| o + 1) as usize;
        Ok(log
            .messages
            .iter()
            .enumerate()
            .skip(start)
            .take(max)
            .map(|(offset, (key, payload))| BusMessage {
                topic: topic.to_string(),
                key: key.clone(),
                payload: payload.clone(),
                offset: offset as u64,
            })
            .collect())
    }

    async fn commit(&self, topic: &str, group: &str, offset: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let log = inner.entry(topic.to_string()).or_default();
        log.committed.insert(group.to_string(), offset);
        Ok(())
    }

    async fn high_watermark(&self, topic: &str) -> Result<u64, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .get(topic)
            .map_or(0, |l| l.messages.len().saturating_sub(1) as u64))
    }
}
