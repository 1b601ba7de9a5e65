//! Audit vocabulary and record shapes.
//!
//! The event vocabulary is closed: an emitter holding a string that does not
//! parse into [`AuditEventType`] cannot put it on the bus. The service-side
//! fields (`sequence_number`, `previous_hash`, `record_hash`, `ingested_at`)
//! are assigned by the audit service alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ContractError;

/// The five audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Decision,
    Action,
    Approval,
    Security,
    System,
}

/// Audit record severity (distinct from alert severity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

macro_rules! audit_event_types {
    ( $( $variant:ident => ($name:literal, $category:ident) ),+ $(,)? ) => {
        /// Closed audit event vocabulary.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum AuditEventType {
            $( #[serde(rename = $name)] $variant, )+
        }

        impl AuditEventType {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( AuditEventType::$variant => $name, )+
                }
            }

            pub fn category(&self) -> EventCategory {
                match self {
                    $( AuditEventType::$variant => EventCategory::$category, )+
                }
            }

            /// Every member of the vocabulary, for emitter-side validation.
            pub fn all() -> &'static [AuditEventType] {
                &[ $( AuditEventType::$variant, )+ ]
            }
        }

        impl std::str::FromStr for AuditEventType {
            type Err = ContractError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $name => Ok(AuditEventType::$variant), )+
                    other => Err(ContractError::UnknownEventType(other.to_string())),
                }
            }
        }
    };
}

audit_event_types! {
    // Decision events
    AlertReceived => ("alert.received", Decision),
    AlertParsed => ("alert.parsed", Decision),
    AlertShortCircuited => ("alert.short_circuited", Decision),
    DecisionClassified => ("decision.classified", Decision),
    DecisionEscalated => ("decision.escalated", Decision),
    StateTransition => ("decision.state_transition", Decision),
    EnrichmentCompleted => ("decision.enrichment_completed", Decision),
    EnrichmentFailed => ("decision.enrichment_failed", Decision),
    ShadowRecorded => ("decision.shadow_recorded", Decision),
    AutoClosed => ("decision.auto_closed", Decision),

    // Action events
    ActionRequested => ("action.requested", Action),
    ActionExecuted => ("action.executed", Action),
    ActionBlocked => ("action.blocked", Action),
    PlaybookSelected => ("action.playbook_selected", Action),
    ActionSkippedShadow => ("action.skipped_shadow", Action),
    ActionRolledBack => ("action.rolled_back", Action),
    NotificationSent => ("action.notification_sent", Action),

    // Approval events
    ApprovalRequested => ("approval.requested", Approval),
    ApprovalGranted => ("approval.granted", Approval),
    ApprovalRejected => ("approval.rejected", Approval),
    ApprovalExpired => ("approval.expired", Approval),
    ApprovalEscalationSignaled => ("approval.escalation_signaled", Approval),
    PatternApproved => ("approval.pattern_approved", Approval),
    PatternReaffirmed => ("approval.pattern_reaffirmed", Approval),
    PatternRevoked => ("approval.pattern_revoked", Approval),

    // Security events
    InjectionDetected => ("injection.detected", Security),
    InjectionQuarantined => ("injection.quarantined", Security),
    TechniqueQuarantined => ("technique.quarantined", Security),
    PiiRedacted => ("pii.redacted", Security),
    ConstraintBlocked => ("constraint.blocked", Security),
    KillSwitchActivated => ("kill_switch.activated", Security),
    KillSwitchDeactivated => ("kill_switch.deactivated", Security),
    SpendLimitExceeded => ("spend.limit_exceeded", Security),
    QuotaExceeded => ("quota.exceeded", Security),
    UntrustedTelemetry => ("telemetry.untrusted", Security),

    // System events
    Genesis => ("system.genesis", System),
    ProviderFailover => ("routing.provider_failover", System),
    DegradationChanged => ("routing.degradation_changed", System),
    DriftElevated => ("drift.elevated", System),
    DriftCleared => ("drift.cleared", System),
    CanaryPromoted => ("canary.promoted", System),
    CanaryRolledBack => ("canary.rolled_back", System),
    ShadowGoLive => ("shadow.go_live", System),
    RetentionExported => ("retention.exported", System),
    VerificationCompleted => ("verification.completed", System),
    InvestigationFailed => ("investigation.failed", System),
}

/// Who performed the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Agent,
    Human,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub actor_type: ActorType,
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Nested provenance context carried on every record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditContext {
    /// Model id / provider / tier behind the decision, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<serde_json::Value>,
    /// Retrieval sources and versions, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxonomy_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// A fully-chained audit record as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Time-sortable record id (UUIDv7)
    pub audit_id: Uuid,
    pub tenant_id: String,
    /// Assigned by the audit service: position in the tenant chain
    pub sequence_number: i64,
    /// Hash of the prior record; genesis carries 64 zeros
    pub previous_hash: String,
    pub timestamp: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,

    pub event_type: AuditEventType,
    pub event_category: EventCategory,
    pub severity: AuditSeverity,

    pub actor: Actor,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(default)]
    pub entity_ids: Vec<String>,

    #[serde(default)]
    pub context: AuditContext,
    /// What was decided
    pub decision: serde_json::Value,
    /// What happened as a result
    pub outcome: serde_json::Value,
    /// URIs of large artifacts in the evidence store
    #[serde(default)]
    pub evidence_refs: Vec<String>,

    /// SHA-256 over the canonical record minus this field
    pub record_hash: String,
    pub record_version: u16,
}

/// The wire payload producers put on `audit.events`: the record minus
/// everything the audit service assigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventEnvelope {
    pub audit_id: Uuid,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
    pub source_service: String,

    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub actor: Actor,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(default)]
    pub entity_ids: Vec<String>,

    #[serde(default)]
    pub context: AuditContext,
    pub decision: serde_json::Value,
    pub outcome: serde_json::Value,
}

impl AuditEventEnvelope {
    /// Build an envelope, stamping a fresh v7 id and the current time.
    pub fn new(
        tenant_id: impl Into<String>,
        source_service: impl Into<String>,
        event_type: AuditEventType,
        severity: AuditSeverity,
        actor: Actor,
    ) -> Self {
        Self {
            audit_id: Uuid::now_v7(),
            tenant_id: tenant_id.into(),
            timestamp: Utc::now(),
            source_service: source_service.into(),
            event_type,
            severity,
            actor,
            investigation_id: None,
            alert_id: None,
            entity_ids: Vec::new(),
            context: AuditContext::default(),
            decision: serde_json::Value::Null,
            outcome: serde_json::Value::Null,
        }
    }

    pub fn with_investigation(mut self, id: Uuid) -> Self {
        self.investigation_id = Some(id);
        self
    }

    pub fn with_alert(mut self, alert_id: impl Into<String>) -> Self {
        self.alert_id = Some(alert_id.into());
        self
    }

    pub fn with_decision(mut self, decision: serde_json::Value) -> Self {
        self.decision = decision;
        self
    }

    pub fn with_outcome(mut self, outcome: serde_json::Value) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_context(mut self, context: AuditContext) -> Self {
        self.context = context;
        self
    }

    /// Emitter-side validation: tenant present, event type in vocabulary
    /// (guaranteed by the type for typed construction; this guards the
    /// deserialization path).
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.tenant_id.trim().is_empty() {
            return Err(ContractError::MissingTenant);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_vocabulary_is_closed() {
        assert!(AuditEventType::from_str("alert.short_circuited").is_ok());
        assert!(AuditEventType::from_str("technique.quarantined").is_ok());
        assert!(AuditEventType::from_str("made.up_event").is_err());
    }

    #[test]
    fn test_vocabulary_size_and_categories() {
        let all = AuditEventType::all();
        assert!(all.len() >= 45, "vocabulary has {} members", all.len());
        for category in [
            EventCategory::Decision,
            EventCategory::Action,
            EventCategory::Approval,
            EventCategory::Security,
            EventCategory::System,
        ] {
            assert!(all.iter().any(|e| e.category() == category));
        }
    }

    #[test]
    fn test_event_type_serde_round_trip() {
        for et in AuditEventType::all() {
            let s = serde_json::to_string(et).unwrap();
            let back: AuditEventType = serde_json::from_str(&s).unwrap();
            assert_eq!(*et, back);
        }
    }

    #[test]
    fn test_unknown_event_type_rejected_on_wire() {
        let raw = serde_json::json!({
            "audit_id": Uuid::now_v7(),
            "tenant_id": "t1",
            "timestamp": "2026-07-01T10:00:00Z",
            "source_service": "orchestrator",
            "event_type": "alert.invented",
            "severity": "info",
            "actor": {"type": "system", "id": "test", "permissions": []},
            "decision": null,
            "outcome": null
        });
        assert!(serde_json::from_value::<AuditEventEnvelope>(raw).is_err());
    }

    #[test]
    fn test_envelope_builder() {
        let env = AuditEventEnvelope::new(
            "t1",
            "orchestrator",
            AuditEventType::AlertShortCircuited,
            AuditSeverity::Info,
            Actor {
                actor_type: ActorType::Agent,
                id: "fp-agent".into(),
                permissions: vec![],
            },
        )
        .with_alert("a1")
        .with_decision(serde_json::json!({"pattern_id": "fp-001"}));

        env.validate().unwrap();
        assert_eq!(env.event_type.category(), EventCategory::Decision);
        assert_eq!(env.alert_id.as_deref(), Some("a1"));
    }

    #[test]
    fn test_missing_tenant_rejected() {
        let env = AuditEventEnvelope::new(
            "",
            "orchestrator",
            AuditEventType::AlertReceived,
            AuditSeverity::Info,
            Actor {
                actor_type: ActorType::System,
                id: "ingest".into(),
                permissions: vec![],
            },
        );
        assert!(env.validate().is_err());
    }
}
