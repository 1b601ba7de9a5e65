//! Executor constraints and the agent role matrix.
//!
//! The executor refuses to act unless every check passes: the playbook is
//! allowlisted, auto-close has both the confidence and the FP match, the
//! acting role holds the permission, and the action is not one of the two
//! things no agent may ever do (modify routing policy, disable guardrails).
//! Every block carries a `constraint_blocked_type` for the audit trail.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use aluskort_schemas::{GraphState, RecommendedAction};

/// Agent roles, closed set. The matrix is code, not configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Triage,
    Enrichment,
    Reasoning,
    Response,
    FpGovernor,
}

impl AgentRole {
    /// Action verbs this role may perform.
    fn permissions(&self) -> &'static [&'static str] {
        match self {
            AgentRole::Triage => &["classify", "annotate"],
            AgentRole::Enrichment => &["query", "annotate"],
            AgentRole::Reasoning => &["classify", "recommend", "annotate"],
            AgentRole::Response => &["execute_playbook", "notify", "annotate"],
            AgentRole::FpGovernor => &["auto_close", "annotate"],
        }
    }

    pub fn can(&self, action_verb: &str) -> bool {
        self.permissions().contains(&action_verb)
    }
}

/// Why an action was blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintBlock {
    PlaybookNotAllowlisted,
    ConfidenceBelowAutoClose,
    FpMatchRequired,
    RoleLacksPermission,
    RoutingPolicyImmutable,
    GuardrailsImmutable,
}

impl ConstraintBlock {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintBlock::PlaybookNotAllowlisted => "playbook_not_allowlisted",
            ConstraintBlock::ConfidenceBelowAutoClose => "confidence_below_auto_close",
            ConstraintBlock::FpMatchRequired => "fp_match_required",
            ConstraintBlock::RoleLacksPermission => "role_lacks_permission",
            ConstraintBlock::RoutingPolicyImmutable => "routing_policy_immutable",
            ConstraintBlock::GuardrailsImmutable => "guardrails_immutable",
        }
    }
}

/// Strict executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConstraints {
    pub allowlisted_playbooks: HashSet<String>,
    pub min_confidence_for_auto_close: f64,
    pub require_fp_match_for_auto_close: bool,
    pub can_modify_routing_policy: bool,
    pub can_disable_guardrails: bool,
}

impl Default for ExecutorConstraints {
    fn default() -> Self {
        Self {
            allowlisted_playbooks: HashSet::new(),
            min_confidence_for_auto_close: 0.90,
            require_fp_match_for_auto_close: true,
            // Never true in any deployment profile.
            can_modify_routing_policy: false,
            can_disable_guardrails: false,
        }
    }
}

impl ExecutorConstraints {
    pub fn with_allowlist(mut self, playbooks: &[&str]) -> Self {
        self.allowlisted_playbooks = playbooks.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Check an action execution.
    pub fn check_action(
        &self,
        action: &RecommendedAction,
        role: AgentRole,
    ) -> Result<(), ConstraintBlock> {
        if action.playbook_id == "modify_routing_policy" && !self.can_modify_routing_policy {
            return Err(ConstraintBlock::RoutingPolicyImmutable);
        }
        if action.playbook_id == "disable_guardrails" && !self.can_disable_guardrails {
            return Err(ConstraintBlock::GuardrailsImmutable);
        }
        if !self.allowlisted_playbooks.contains(&action.playbook_id) {
            return Err(ConstraintBlock::PlaybookNotAllowlisted);
        }
        if !role.can("execute_playbook") {
            return Err(ConstraintBlock::RoleLacksPermission);
        }
        Ok(())
    }

    /// Check an auto-close: BOTH the confidence bar and the FP match.
    pub fn check_auto_close(&self, state: &GraphState, role: AgentRole) -> Result<(), ConstraintBlock> {
        if !role.can("auto_close") {
            return Err(ConstraintBlock::RoleLacksPermission);
        }
        if state.confidence < self.min_confidence_for_auto_close {
            return Err(ConstraintBlock::ConfidenceBelowAutoClose);
        }
        if self.require_fp_match_for_auto_close && !state.fp_matched {
            return Err(ConstraintBlock::FpMatchRequired);
        }
        Ok(())
    }
}
