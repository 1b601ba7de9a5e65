//! Approval gates for high-tier actions.
//!
//! Deadline scales with severity and is overridable per tenant. At half the
//! interval a one-shot escalation signal fires. Expiry semantics differ by
//! severity: critical/high escalate and stay open, medium/low resolve as
//! rejected and close.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use aluskort_schemas::{ActionTier, RecommendedAction, Severity};

/// Gate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Pending,
    Approved,
    Rejected,
    /// Deadline passed on critical/high: investigation stays open
    Escalated,
    /// Deadline passed on medium/low: resolved as rejected
    ExpiredRejected,
}

/// One pending approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalGate {
    pub gate_id: Uuid,
    pub investigation_id: Uuid,
    pub tenant_id: String,
    pub action: RecommendedAction,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub outcome: ApprovalOutcome,
    pub decided_by: Option<String>,
    escalation_signaled: bool,
}

/// Default deadline by severity.
fn default_deadline(severity: Severity) -> Duration {
    match severity {
        Severity::Critical => Duration::hours(1),
        Severity::High => Duration::hours(2),
        Severity::Medium => Duration::hours(4),
        Severity::Low | Severity::Informational => Duration::hours(8),
    }
}

/// Manages gates for all live investigations.
pub struct ApprovalGateManager {
    gates: RwLock<HashMap<Uuid, ApprovalGate>>,
    /// Per-tenant deadline overrides by severity
    tenant_overrides: RwLock<HashMap<(String, Severity), Duration>>,
    /// Actions at or above this tier require approval
    pub approval_tier_threshold: ActionTier,
}

impl ApprovalGateManager {
    pub fn new(approval_tier_threshold: ActionTier) -> Self {
        Self {
            gates: RwLock::new(HashMap::new()),
            tenant_overrides: RwLock::new(HashMap::new()),
            approval_tier_threshold,
        }
    }

    pub fn set_tenant_deadline(&self, tenant_id: &str, severity: Severity, deadline: Duration) {
        self.tenant_overrides
            .write()
            .insert((tenant_id.to_string(), severity), deadline);
    }

    fn deadline_for(&self, tenant_id: &str, severity: Severity) -> Duration {
        self.tenant_overrides
            .read()
            .get(&(tenant_id.to_string(), severity))
            .copied()
            .unwrap_or_else(|| default_deadline(severity))
    }

    /// Does this action cross the approval threshold?
    pub fn requires_approval(&self, action: &RecommendedAction) -> bool {
        action.tier >= self.approval_tier_threshold
    }

    /// Open a gate for an action.
    pub fn open(
        &self,
        investigation_id: Uuid,
        tenant_id: &str,
        action: RecommendedAction,
        severity: Severity,
    ) -> ApprovalGate {
        let now = Utc::now();
        let gate = ApprovalGate {
            gate_id: Uuid::new_v4(),
            investigation_id,
            tenant_id: tenant_id.to_string(),
            action,
            severity,
            created_at: now,
            deadline: now + self.deadline_for(tenant_id, severity),
            outcome: ApprovalOutcome::Pending,
            decided_by: None,
            escalation_signaled: false,
        };
        self.gates.write().insert(gate.gate_id, gate.clone());
        gate
    }

    pub fn get(&self, gate_id: Uuid) -> Option<ApprovalGate> {
        self.gates.read().get(&gate_id).cloned()
    }

    pub fn approve(&self, gate_id: Uuid, approver: &str) -> Option<ApprovalGate> {
        self.decide(gate_id, approver, ApprovalOutcome::Approved)
    }

    pub fn reject(&self, gate_id: Uuid, approver: &str) -> Option<ApprovalGate> {
        self.decide(gate_id, approver, ApprovalOutcome::Rejected)
    }

    fn decide(&self, gate_id: Uuid, approver: &str, outcome: ApprovalOutcome) -> Option<ApprovalGate> {
        let mut gates = self.gates.write();
        let gate = gates.get_mut(&gate_id)?;
        if gate.outcome != ApprovalOutcome::Pending {
            return None;
        }
        gate.outcome = outcome;
        gate.decided_by = Some(approver.to_string());
        Some(gate.clone())
    }

    /// Gates past 50% of their interval that have not yet signaled. Each
    /// gate signals exactly once, no matter how often this sweeps.
    pub fn due_escalation_signals(&self, now: DateTime<Utc>) -> Vec<ApprovalGate> {
        let mut gates = self.gates.write();
        gates
            .values_mut()
            .filter(|g| g.outcome == ApprovalOutcome::Pending && !g.escalation_signaled)
            .filter(|g| {
                let halfway = g.created_at + (g.deadline - g.created_at) / 2;
                now >= halfway
            })
            .map(|g| {
                g.escalation_signaled = true;
                g.clone()
            })
            .collect()
    }

    /// Expire gates past deadline. Critical/high escalate (stay open);
    /// medium/low resolve as rejected.
    pub fn expire_due(&self, now: DateTime<Utc>) -> Vec<ApprovalGate> {
        let mut gates = self.gates.write();
        gates
            .values_mut()
            .filter(|g| g.outcome == ApprovalOutcome::Pending && now > g.deadline)
            .map(|g| {
                g.outcome = if g.severity.is_high_or_critical() {
                    ApprovalOutcome::Escalated
                } else {
                    ApprovalOutcome::ExpiredRejected
                };
                g.clone()
            })
            .collect()
    }
}
