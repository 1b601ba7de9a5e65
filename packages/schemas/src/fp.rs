//! FP pattern definitions.
//!
//! Patterns are owned by the governance API; everything here is shape and
//! matching configuration. Lifecycle rules (two-person approval, canary
//! promotion, expiry) live in `aluskort-governance`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pattern lifecycle status. `Expired` and `Revoked` are terminal within a
/// pattern version; re-activation means a new pattern id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    /// Created, awaiting two-person approval
    Pending,
    /// First approval recorded, awaiting a distinct second approver
    Approved,
    /// Observing only: candidate closes tallied against analyst outcomes
    Shadow,
    /// Live, may short-circuit investigations
    Active,
    Expired,
    Revoked,
}

/// How an entity condition matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntityMatcher {
    /// Regular expression over the entity value
    Regex(String),
    /// CIDR block containment for IP entities
    Cidr(String),
}

/// Pattern scope. An empty scope matches any investigation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternScope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_class: Option<String>,
}

impl PatternScope {
    pub fn is_empty(&self) -> bool {
        self.rule_family.is_none() && self.tenant_id.is_none() && self.asset_class.is_none()
    }
}

/// A governed false-positive pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpPattern {
    pub pattern_id: String,
    /// Alert names (titles) this pattern covers
    pub alert_names: Vec<String>,
    /// Entity conditions (regex / CIDR)
    pub entity_matchers: Vec<EntityMatcher>,
    /// Composite confidence must reach this to short-circuit
    pub confidence_threshold: f64,
    pub status: PatternStatus,

    // Governance
    pub approved_by_1: Option<String>,
    pub approved_by_2: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub reaffirmed_date: Option<DateTime<Utc>>,
    pub reaffirmed_by: Option<String>,

    pub scope: PatternScope,
    pub created_at: DateTime<Utc>,

    // Counters
    pub match_count: u64,
    pub agree_count: u64,
    pub disagree_count: u64,
}

impl FpPattern {
    pub fn new(pattern_id: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            alert_names: Vec::new(),
            entity_matchers: Vec::new(),
            confidence_threshold: 0.90,
            status: PatternStatus::Pending,
            approved_by_1: None,
            approved_by_2: None,
            expiry_date: None,
            reaffirmed_date: None,
            reaffirmed_by: None,
            scope: PatternScope::default(),
            created_at: Utc::now(),
            match_count: 0,
            agree_count: 0,
            disagree_count: 0,
        }
    }

    pub fn with_alert_names(mut self, names: Vec<String>) -> Self {
        self.alert_names = names;
        self
    }

    pub fn with_entity_matchers(mut self, matchers: Vec<EntityMatcher>) -> Self {
        self.entity_matchers = matchers;
        self
    }

    pub fn with_scope(mut self, scope: PatternScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_status(mut self, status: PatternStatus) -> Self {
        self.status = status;
        self
    }

    /// Age since creation, used by the 100%-review rule for novel patterns.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }

    /// Disagreement rate over tallied canary decisions.
    pub fn disagreement_rate(&self) -> f64 {
        let total = self.agree_count + self.disagree_count;
        if total == 0 {
            return 0.0;
        }
        self.disagree_count as f64 / total as f64
    }
}
