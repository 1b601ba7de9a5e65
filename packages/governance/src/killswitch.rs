//! Kill switches: operator-triggered suppression of auto-closure.
//!
//! Four dimensions - tenant, pattern, technique, data source - each backed by
//! a cache key so activation is visible to every instance immediately. Any
//! active switch in scope suppresses the FP short-circuit. Activation and
//! deactivation are audited with the operator's identity and reason.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use aluskort_persistence::{keys, publish_audit, CacheStore, MessageBus};
use aluskort_schemas::{Actor, ActorType, AuditEventEnvelope, AuditEventType, AuditSeverity};

/// Switch dimensions. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitchDimension {
    Tenant,
    Pattern,
    Technique,
    DataSource,
}

impl KillSwitchDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillSwitchDimension::Tenant => "tenant",
            KillSwitchDimension::Pattern => "pattern",
            KillSwitchDimension::Technique => "technique",
            KillSwitchDimension::DataSource => "data_source",
        }
    }
}

/// Stored switch payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchEntry {
    pub dimension: KillSwitchDimension,
    pub value: String,
    pub activated_by: String,
    pub reason: String,
    pub activated_at: chrono::DateTime<chrono::Utc>,
}

/// The scope of one candidate auto-close, checked against all dimensions.
#[derive(Debug, Clone, Default)]
pub struct KillSwitchScope {
    pub tenant_id: Option<String>,
    pub pattern_id: Option<String>,
    pub techniques: Vec<String>,
    pub data_source: Option<String>,
}

/// Manager over cache-backed switches. Switches are long-lived; the TTL is a
/// backstop against forgotten entries, not an expiry semantic.
pub struct KillSwitchManager {
    cache: Arc<dyn CacheStore>,
    bus: Arc<dyn MessageBus>,
    ttl: Duration,
}

impl KillSwitchManager {
    pub fn new(cache: Arc<dyn CacheStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            cache,
            bus,
            ttl: Duration::from_secs(30 * 24 * 3600),
        }
    }

    /// Activate a switch. Audited with actor identity and reason.
    pub async fn activate(
        &self,
        dimension: KillSwitchDimension,
        value: &str,
        activated_by: &str,
        reason: &str,
    ) {
        let entry = KillSwitchEntry {
            dimension,
            value: value.to_string(),
            activated_by: activated_by.to_string(),
            reason: reason.to_string(),
            activated_at: chrono::Utc::now(),
        };
        let key = keys::kill_switch(dimension.as_str(), value);
        if let Ok(json) = serde_json::to_string(&entry) {
            self.cache.set_with_ttl(&key, &json, self.ttl).await;
        }
        tracing::warn!(
            dimension = dimension.as_str(),
            value = %value,
            activated_by = %activated_by,
            reason = %reason,
            "kill switch activated"
        );
        self.emit(
            AuditEventType::KillSwitchActivated,
            dimension,
            value,
            activated_by,
            reason,
        )
        .await;
    }

    /// Deactivate a switch. Also audited.
    pub async fn deactivate(
        &self,
        dimension: KillSwitchDimension,
        value: &str,
        deactivated_by: &str,
        reason: &str,
    ) {
        let key = keys::kill_switch(dimension.as_str(), value);
        self.cache.delete(&key).await;
        tracing::warn!(
            dimension = dimension.as_str(),
            value = %value,
            deactivated_by = %deactivated_by,
            "kill switch deactivated"
        );
        self.emit(
            AuditEventType::KillSwitchDeactivated,
            dimension,
            value,
            deactivated_by,
            reason,
        )
        .await;
    }

    pub async fn is_active(&self, dimension: KillSwitchDimension, value: &str) -> bool {
        let key = keys::kill_switch(dimension.as_str(), value);
        self.cache.get(&key).await.is_some()
    }

    /// OR over all four dimensions: any active switch suppresses the
    /// short-circuit for this scope.
    pub async fn is_suppressed(&self, scope: &KillSwitchScope) -> bool {
        if let Some(tenant) = &scope.tenant_id {
            if self.is_active(KillSwitchDimension::Tenant, tenant).await {
                return true;
            }
        }
        if let Some(pattern) = &scope.pattern_id {
            if self.is_active(KillSwitchDimension::Pattern, pattern).await {
                return true;
            }
        }
        for technique in &scope.techniques {
            if self.is_active(KillSwitchDimension::Technique, technique).await {
                return true;
            }
        }
        if let Some(source) = &scope.data_source {
            if self.is_active(KillSwitchDimension::DataSource, source).await {
                return true;
            }
        }
        false
    }

    async fn emit(
        &self,
        event_type: AuditEventType,
        dimension: KillSwitchDimension,
        value: &str,
        actor_id: &str,
        reason: &str,
    ) {
        let envelope = AuditEventEnvelope::new(
            "platform",
            "governance",
            event_type,
            AuditSeverity::Warning,
            Actor {
                actor_type: ActorType::Human,
                id: actor_id.to_string(),
                permissions: vec!["kill_switch".into()],
            },
        )
        .with_decision(serde_json::json!({
            "dimension": dimension.as_str(),
            "value": value,
            "reason": reason,
        }));
        if let Err(e) = publish_audit(self.bus.as_ref(), &envelope).await {
            tracing::error!(error = %e, "kill switch audit emission failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aluskort_persistence::{topics, InMemoryBus, MemoryCache};

    fn manager() -> (KillSwitchManager, Arc<InMemoryBus>) {
        let bus = Arc::new(InMemoryBus::new());
        (
            KillSwitchManager::new(Arc::new(MemoryCache::new()), bus.clone()),
            bus,
        )
    }

    #[tokio::test]
    async fn test_activate_and_check() {
        let (manager, _bus) = manager();
        assert!(!manager.is_active(KillSwitchDimension::Tenant, "t1").await);
        manager
            .activate(KillSwitchDimension::Tenant, "t1", "oncall@example.com", "fp storm")
            .await;
        assert!(manager.is_active(KillSwitchDimension::Tenant, "t1").await);
    }

    #[tokio::test]
    async fn test_scope_or_semantics() {
        let (manager, _bus) = manager();
        manager
            .activate(KillSwitchDimension::Technique, "T1059", "oncall", "bad mapping")
            .await;

        let scope = KillSwitchScope {
            tenant_id: Some("t1".into()),
            pattern_id: Some("fp-001".into()),
            techniques: vec!["T1078".into(), "T1059".into()],
            data_source: None,
        };
        assert!(manager.is_suppressed(&scope).await);

        let unrelated = KillSwitchScope {
            tenant_id: Some("t1".into()),
            techniques: vec!["T1078".into()],
            ..Default::default()
        };
        assert!(!manager.is_suppressed(&unrelated).await);
    }

    #[tokio::test]
    async fn test_deactivate_clears() {
        let (manager, _bus) = manager();
        manager
            .activate(KillSwitchDimension::Pattern, "fp-001", "oncall", "regression")
            .await;
        manager
            .deactivate(KillSwitchDimension::Pattern, "fp-001", "oncall", "fixed")
            .await;
        assert!(!manager.is_active(KillSwitchDimension::Pattern, "fp-001").await);
    }

    #[tokio::test]
    async fn test_activation_is_audited() {
        let (manager, bus) = manager();
        manager
            .activate(KillSwitchDimension::DataSource, "wiz", "oncall", "noisy feed")
            .await;
        let events = bus.poll(topics::AUDIT_EVENTS, "test", 10).await.unwrap();
        assert_eq!(events.len(), 1);
        let env: AuditEventEnvelope = serde_json::from_slice(&events[0].payload).unwrap();
        assert_eq!(env.event_type, AuditEventType::KillSwitchActivated);
        assert_eq!(env.actor.id, "oncall");
    }
}
