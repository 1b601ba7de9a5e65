//! Investigation state: the graph the orchestrator drives.
//!
//! `GraphState` accumulates enrichment context and decisions as the
//! investigation advances. The `decision_chain` is append-only and ordered by
//! the orchestrator; once an entry lands it is never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::alert::Severity;
use crate::error::ContractError;

/// Investigation lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationState {
    Received,
    Parsing,
    FpCheck,
    Enriching,
    Reasoning,
    AwaitingHuman,
    Responding,
    Closed,
    Failed,
}

impl InvestigationState {
    /// Legal forward transitions. `Failed` is reachable from anywhere.
    pub fn can_transition_to(&self, next: InvestigationState) -> bool {
        use InvestigationState::*;
        if next == Failed {
            return !matches!(self, Closed | Failed);
        }
        matches!(
            (self, next),
            (Received, Parsing)
                | (Parsing, FpCheck)
                | (FpCheck, Closed)
                | (FpCheck, Enriching)
                | (Enriching, Reasoning)
                | (Reasoning, Responding)
                | (Reasoning, AwaitingHuman)
                | (Reasoning, Closed)
                | (AwaitingHuman, Responding)
                | (AwaitingHuman, Closed)
                | (Responding, Closed)
        )
    }

    /// Terminal states release the investigation's arena slot.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvestigationState::Closed | InvestigationState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationState::Received => "received",
            InvestigationState::Parsing => "parsing",
            InvestigationState::FpCheck => "fp_check",
            InvestigationState::Enriching => "enriching",
            InvestigationState::Reasoning => "reasoning",
            InvestigationState::AwaitingHuman => "awaiting_human",
            InvestigationState::Responding => "responding",
            InvestigationState::Closed => "closed",
            InvestigationState::Failed => "failed",
        }
    }
}

/// Task priority used for router slots and queue selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Priority::Critical,
            Severity::High => Priority::High,
            Severity::Medium => Priority::Normal,
            Severity::Low | Severity::Informational => Priority::Low,
        }
    }
}

/// Tenant subscription tier, bounds the hourly LLM quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantTier {
    Premium,
    Standard,
    Trial,
}

/// Final classification of an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    TruePositive,
    FalsePositive,
    Suspicious,
    Benign,
    /// Approval expired on a critical/high action; investigation stays open
    Escalated,
}

/// Trust status of the telemetry a decision rests on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationStatus {
    Trusted,
    Untrusted,
    Mixed,
    #[default]
    NotApplicable,
}

/// Action blast-radius tier. Tier 0 is observation only; higher tiers touch
/// production systems and cross the approval threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionTier(pub u8);

/// An action the reasoning step recommends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedAction {
    /// Playbook identifier
    pub playbook_id: String,
    pub description: String,
    pub tier: ActionTier,
}

/// One append-only entry in the investigation's decision chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEntry {
    /// Agent node that made the transition
    pub agent: String,
    pub from_state: InvestigationState,
    pub to_state: InvestigationState,
    pub timestamp: DateTime<Utc>,
    pub taxonomy_version: String,
    pub attestation_status: AttestationStatus,
    /// Free-form structured details (enricher output summary, error text, ...)
    pub details: serde_json::Value,
}

/// IOC lookup hit merged in during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IocHit {
    pub ioc_type: String,
    pub value: String,
    /// Provider confidence 0-100
    pub confidence: u8,
    pub source: String,
}

/// UEBA risk context for the principal entities on the alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UebaRisk {
    pub entity: String,
    /// 0.0 - 1.0
    pub risk_score: f64,
    pub anomalies: Vec<String>,
}

/// A CTEM exposure correlated to an alert entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtemExposure {
    pub exposure_id: String,
    pub asset: String,
    pub severity: Severity,
    pub description: String,
}

/// ATLAS technique match with its telemetry provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasMatch {
    pub technique_id: String,
    /// "trusted" | "untrusted" per detection attestation
    pub telemetry_trust_level: String,
    pub detection_id: String,
}

/// A prior incident retrieved as similar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarIncident {
    pub incident_id: String,
    pub similarity: f64,
    pub age_days: f64,
    pub rare_important: bool,
    pub resolution: Option<String>,
}

/// Structured case summary carried across retrieval passes so repeated
/// reasoning calls do not re-pay the token cost of raw context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseFacts {
    pub entities: HashMap<String, Vec<String>>,
    pub iocs: Vec<String>,
    pub techniques: Vec<String>,
    pub timeline: Vec<TimelineEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub summary: String,
}

/// The investigation graph state. Owned exclusively by the orchestrator until
/// persisted terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphState {
    pub investigation_id: Uuid,
    pub alert_id: String,
    pub tenant_id: String,
    pub state: InvestigationState,

    // Accumulated context
    pub entities: HashMap<String, Vec<String>>,
    pub ioc_hits: Vec<IocHit>,
    pub ueba_risk: Option<UebaRisk>,
    pub ctem_exposures: Vec<CtemExposure>,
    pub atlas_matches: Vec<AtlasMatch>,
    pub similar_incidents: Vec<SimilarIncident>,
    pub candidate_playbooks: Vec<String>,
    pub case_facts: CaseFacts,

    // Decisions
    pub classification: Option<Classification>,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub severity: Severity,
    pub recommended_actions: Vec<RecommendedAction>,
    pub requires_human_approval: bool,
    pub risk_state: Option<String>,
    pub fp_matched: bool,
    pub fp_pattern_id: Option<String>,

    // Budget counters
    pub llm_calls: u32,
    pub total_cost_usd: f64,
    pub queries_executed: u32,

    decision_chain: Vec<DecisionEntry>,
}

impl GraphState {
    pub fn new(alert_id: impl Into<String>, tenant_id: impl Into<String>, severity: Severity) -> Self {
        Self {
            investigation_id: Uuid::new_v4(),
            alert_id: alert_id.into(),
            tenant_id: tenant_id.into(),
            state: InvestigationState::Received,
            entities: HashMap::new(),
            ioc_hits: Vec::new(),
            ueba_risk: None,
            ctem_exposures: Vec::new(),
            atlas_matches: Vec::new(),
            similar_incidents: Vec::new(),
            candidate_playbooks: Vec::new(),
            case_facts: CaseFacts::default(),
            classification: None,
            confidence: 0.0,
            severity,
            recommended_actions: Vec::new(),
            requires_human_approval: false,
            risk_state: None,
            fp_matched: false,
            fp_pattern_id: None,
            llm_calls: 0,
            total_cost_usd: 0.0,
            queries_executed: 0,
            decision_chain: Vec::new(),
        }
    }

    /// Transition to `next`, appending a chain entry. Illegal transitions are
    /// contract violations and leave the state untouched.
    pub fn transition(
        &mut self,
        next: InvestigationState,
        agent: impl Into<String>,
        taxonomy_version: impl Into<String>,
        attestation: AttestationStatus,
        details: serde_json::Value,
    ) -> Result<&DecisionEntry, ContractError> {
        if !self.state.can_transition_to(next) {
            return Err(ContractError::IllegalTransition {
                from: self.state.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        let entry = DecisionEntry {
            agent: agent.into(),
            from_state: self.state,
            to_state: next,
            timestamp: Utc::now(),
            taxonomy_version: taxonomy_version.into(),
            attestation_status: attestation,
            details,
        };
        self.state = next;
        self.decision_chain.push(entry);
        Ok(self.decision_chain.last().unwrap())
    }

    /// Append a non-transition entry (enricher completion, error record).
    pub fn append_note(
        &mut self,
        agent: impl Into<String>,
        taxonomy_version: impl Into<String>,
        attestation: AttestationStatus,
        details: serde_json::Value,
    ) {
        self.decision_chain.push(DecisionEntry {
            agent: agent.into(),
            from_state: self.state,
            to_state: self.state,
            timestamp: Utc::now(),
            taxonomy_version: taxonomy_version.into(),
            attestation_status: attestation,
            details,
        });
    }

    /// Read-only view of the chain.
    pub fn decision_chain(&self) -> &[DecisionEntry] {
        &self.decision_chain
    }

    /// True when every supporting ATLAS detection is marked untrusted.
    pub fn all_atlas_untrusted(&self) -> bool {
        !self.atlas_matches.is_empty()
            && self
                .atlas_matches
                .iter()
                .all(|m| m.telemetry_trust_level == "untrusted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GraphState {
        GraphState::new("a1", "t1", Severity::High)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut s = state();
        for next in [
            InvestigationState::Parsing,
            InvestigationState::FpCheck,
            InvestigationState::Enriching,
            InvestigationState::Reasoning,
            InvestigationState::Responding,
            InvestigationState::Closed,
        ] {
            s.transition(next, "orchestrator", "v1", AttestationStatus::NotApplicable, serde_json::Value::Null)
                .unwrap();
        }
        assert_eq!(s.state, InvestigationState::Closed);
        assert_eq!(s.decision_chain().len(), 6);
    }

    #[test]
    fn test_fp_short_circuit_path() {
        let mut s = state();
        s.transition(InvestigationState::Parsing, "o", "v1", AttestationStatus::NotApplicable, serde_json::Value::Null).unwrap();
        s.transition(InvestigationState::FpCheck, "o", "v1", AttestationStatus::NotApplicable, serde_json::Value::Null).unwrap();
        s.transition(InvestigationState::Closed, "o", "v1", AttestationStatus::NotApplicable, serde_json::Value::Null).unwrap();
        assert!(s.state.is_terminal());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut s = state();
        let err = s
            .transition(InvestigationState::Responding, "o", "v1", AttestationStatus::NotApplicable, serde_json::Value::Null)
            .unwrap_err();
        assert!(matches!(err, ContractError::IllegalTransition { .. }));
        assert_eq!(s.state, InvestigationState::Received);
        assert!(s.decision_chain().is_empty());
    }

    #[test]
    fn test_failed_reachable_from_anywhere_but_terminal() {
        let mut s = state();
        s.transition(InvestigationState::Failed, "o", "v1", AttestationStatus::NotApplicable, serde_json::Value::Null).unwrap();
        assert_eq!(s.state, InvestigationState::Failed);
        assert!(s
            .transition(InvestigationState::Parsing, "o", "v1", AttestationStatus::NotApplicable, serde_json::Value::Null)
            .is_err());
    }

    #[test]
    fn test_chain_is_ordered() {
        let mut s = state();
        s.append_note("enricher.ueba", "v1", AttestationStatus::Trusted, serde_json::json!({"n": 1}));
        s.append_note("enricher.ctem", "v1", AttestationStatus::Trusted, serde_json::json!({"n": 2}));
        let agents: Vec<_> = s.decision_chain().iter().map(|e| e.agent.clone()).collect();
        assert_eq!(agents, vec!["enricher.ueba", "enricher.ctem"]);
    }

    #[test]
    fn test_all_atlas_untrusted() {
        let mut s = state();
        assert!(!s.all_atlas_untrusted());
        s.atlas_matches.push(AtlasMatch {
            technique_id: "AML.T0051".into(),
            telemetry_trust_level: "untrusted".into(),
            detection_id: "d1".into(),
        });
        assert!(s.all_atlas_untrusted());
        s.atlas_matches.push(AtlasMatch {
            technique_id: "AML.T0043".into(),
            telemetry_trust_level: "trusted".into(),
            detection_id: "d2".into(),
        });
        assert!(!s.all_atlas_untrusted());
    }

    #[test]
    fn test_priority_from_severity() {
        assert_eq!(Priority::from_severity(Severity::Critical), Priority::Critical);
        assert_eq!(Priority::from_severity(Severity::Medium), Priority::Normal);
        assert_eq!(Priority::from_severity(Severity::Informational), Priority::Low);
    }
}
