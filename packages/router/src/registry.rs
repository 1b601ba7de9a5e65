//! Model and task registries.
//!
//! The task set is closed; an unknown task routes at tier-1. Fallbacks exist
//! for tier-0 and tier-1 only - above that, degradation absorbs the gap
//! rather than silently substituting a weaker model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Model tiers, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier0,
    Tier1,
    Tier1Plus,
    Tier2,
}

/// A registered model and its capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: String,
    pub model_id: String,
    pub max_context_tokens: u64,
    /// USD per million input tokens
    pub cost_in: f64,
    /// USD per million output tokens
    pub cost_out: f64,
    pub supports_tool_use: bool,
    pub supports_json: bool,
    pub supports_extended_thinking: bool,
    pub supports_prompt_caching: bool,
    pub batch_eligible: bool,
}

/// What a task needs from a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskCapabilities {
    pub requires_tool_use: bool,
    pub requires_json_reliability: bool,
    pub max_context_tokens: u64,
    pub latency_slo_s: f64,
    pub requires_extended_thinking: bool,
}

impl ModelSpec {
    /// Does this model satisfy the task's requirements?
    pub fn satisfies(&self, caps: &TaskCapabilities) -> bool {
        (!caps.requires_tool_use || self.supports_tool_use)
            && (!caps.requires_json_reliability || self.supports_json)
            && (!caps.requires_extended_thinking || self.supports_extended_thinking)
            && self.max_context_tokens >= caps.max_context_tokens
    }
}

/// The closed task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    AlertClassification,
    EntityExtraction,
    AlertSummarization,
    InjectionReview,
    TechniqueMapping,
    PlaybookSelection,
    ResponseDrafting,
    DeepInvestigation,
    ThreatIntelSynthesis,
    QueryGeneration,
    TimelineReconstruction,
    RiskScoring,
    FpReview,
    EscalationReview,
    EvidenceSummarization,
    ComplianceNarrative,
    AnalystChat,
    ReportTranslation,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::AlertClassification => "alert_classification",
            TaskKind::EntityExtraction => "entity_extraction",
            TaskKind::AlertSummarization => "alert_summarization",
            TaskKind::InjectionReview => "injection_review",
            TaskKind::TechniqueMapping => "technique_mapping",
            TaskKind::PlaybookSelection => "playbook_selection",
            TaskKind::ResponseDrafting => "response_drafting",
            TaskKind::DeepInvestigation => "deep_investigation",
            TaskKind::ThreatIntelSynthesis => "threat_intel_synthesis",
            TaskKind::QueryGeneration => "query_generation",
            TaskKind::TimelineReconstruction => "timeline_reconstruction",
            TaskKind::RiskScoring => "risk_scoring",
            TaskKind::FpReview => "fp_review",
            TaskKind::EscalationReview => "escalation_review",
            TaskKind::EvidenceSummarization => "evidence_summarization",
            TaskKind::ComplianceNarrative => "compliance_narrative",
            TaskKind::AnalystChat => "analyst_chat",
            TaskKind::ReportTranslation => "report_translation",
        }
    }

    /// Base tier before overrides.
    pub fn base_tier(&self) -> Tier {
        match self {
            TaskKind::EntityExtraction
            | TaskKind::AlertSummarization
            | TaskKind::InjectionReview
            | TaskKind::QueryGeneration
            | TaskKind::ReportTranslation => Tier::Tier0,
            TaskKind::AlertClassification
            | TaskKind::TechniqueMapping
            | TaskKind::PlaybookSelection
            | TaskKind::RiskScoring
            | TaskKind::FpReview
            | TaskKind::EvidenceSummarization
            | TaskKind::AnalystChat
            | TaskKind::ComplianceNarrative => Tier::Tier1,
            TaskKind::ResponseDrafting
            | TaskKind::TimelineReconstruction
            | TaskKind::ThreatIntelSynthesis
            | TaskKind::EscalationReview => Tier::Tier1Plus,
            TaskKind::DeepInvestigation => Tier::Tier2,
        }
    }

    /// Does this task involve multi-step reasoning? Used by the critical
    /// severity override.
    pub fn requires_reasoning(&self) -> bool {
        matches!(
            self,
            TaskKind::AlertClassification
                | TaskKind::DeepInvestigation
                | TaskKind::ResponseDrafting
                | TaskKind::TimelineReconstruction
                | TaskKind::ThreatIntelSynthesis
                | TaskKind::EscalationReview
                | TaskKind::RiskScoring
        )
    }

    pub fn capabilities(&self) -> TaskCapabilities {
        TaskCapabilities {
            requires_tool_use: matches!(self, TaskKind::QueryGeneration | TaskKind::DeepInvestigation),
            requires_json_reliability: !matches!(self, TaskKind::AnalystChat | TaskKind::ComplianceNarrative),
            max_context_tokens: match self {
                TaskKind::DeepInvestigation | TaskKind::TimelineReconstruction => 200_000,
                _ => 32_000,
            },
            latency_slo_s: match self.base_tier() {
                Tier::Tier0 => 3.0,
                Tier::Tier1 => 15.0,
                Tier::Tier1Plus => 60.0,
                Tier::Tier2 => 300.0,
            },
            requires_extended_thinking: matches!(self, TaskKind::DeepInvestigation),
        }
    }
}

/// Tier -> primary model.
pub fn default_registry() -> HashMap<Tier, ModelSpec> {
    let mut registry = HashMap::new();
    registry.insert(
        Tier::Tier0,
        ModelSpec {
            provider: "anthropic".into(),
            model_id: "claude-3-5-haiku".into(),
            max_context_tokens: 200_000,
            cost_in: 0.80,
            cost_out: 4.00,
            supports_tool_use: true,
            supports_json: true,
            supports_extended_thinking: false,
            supports_prompt_caching: true,
            batch_eligible: true,
        },
    );
    registry.insert(
        Tier::Tier1,
        ModelSpec {
            provider: "anthropic".into(),
            model_id: "claude-sonnet-4".into(),
            max_context_tokens: 200_000,
            cost_in: 3.00,
            cost_out: 15.00,
            supports_tool_use: true,
            supports_json: true,
            supports_extended_thinking: true,
            supports_prompt_caching: true,
            batch_eligible: true,
        },
    );
    registry.insert(
        Tier::Tier1Plus,
        ModelSpec {
            provider: "anthropic".into(),
            model_id: "claude-sonnet-4".into(),
            max_context_tokens: 200_000,
            cost_in: 3.00,
            cost_out: 15.00,
            supports_tool_use: true,
            supports_json: true,
            supports_extended_thinking: true,
            supports_prompt_caching: true,
            batch_eligible: false,
        },
    );
    registry.insert(
        Tier::Tier2,
        ModelSpec {
            provider: "anthropic".into(),
            model_id: "claude-opus-4".into(),
            max_context_tokens: 200_000,
            cost_in: 15.00,
            cost_out: 75.00,
            supports_tool_use: true,
            supports_json: true,
            supports_extended_thinking: true,
            supports_prompt_caching: true,
            batch_eligible: false,
        },
    );
    registry
}

/// Tier -> ordered fallbacks. Tier-1+ and tier-2 are deliberately empty:
/// degradation policy absorbs the gap instead of substituting downward.
pub fn default_fallbacks() -> HashMap<Tier, Vec<ModelSpec>> {
    let mut fallbacks = HashMap::new();
    fallbacks.insert(
        Tier::Tier0,
        vec![ModelSpec {
            provider: "openai".into(),
            model_id: "gpt-4o-mini".into(),
            max_context_tokens: 128_000,
            cost_in: 0.15,
            cost_out: 0.60,
            supports_tool_use: true,
            supports_json: true,
            supports_extended_thinking: false,
            supports_prompt_caching: true,
            batch_eligible: true,
        }],
    );
    fallbacks.insert(
        Tier::Tier1,
        vec![ModelSpec {
            provider: "openai".into(),
            model_id: "gpt-4o".into(),
            max_context_tokens: 128_000,
            cost_in: 2.50,
            cost_out: 10.00,
            supports_tool_use: true,
            supports_json: true,
            supports_extended_thinking: false,
            supports_prompt_caching: true,
            batch_eligible: true,
        }],
    );
    fallbacks.insert(Tier::Tier1Plus, Vec::new());
    fallbacks.insert(Tier::Tier2, Vec::new());
    fallbacks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tier_has_a_primary() {
        let registry = default_registry();
        for tier in [Tier::Tier0, Tier::Tier1, Tier::Tier1Plus, Tier::Tier2] {
            assert!(registry.contains_key(&tier));
        }
    }

    #[test]
    fn test_upper_tiers_have_no_fallback() {
        let fallbacks = default_fallbacks();
        assert!(!fallbacks[&Tier::Tier0].is_empty());
        assert!(!fallbacks[&Tier::Tier1].is_empty());
        assert!(fallbacks[&Tier::Tier1Plus].is_empty());
        assert!(fallbacks[&Tier::Tier2].is_empty());
    }

    #[test]
    fn test_capability_match() {
        let caps = TaskKind::DeepInvestigation.capabilities();
        let registry = default_registry();
        assert!(registry[&Tier::Tier2].satisfies(&caps));

        let fallbacks = default_fallbacks();
        // gpt-4o-mini cannot do extended thinking
        assert!(!fallbacks[&Tier::Tier0][0].satisfies(&caps));
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Tier0 < Tier::Tier1);
        assert!(Tier::Tier1 < Tier::Tier1Plus);
        assert!(Tier::Tier1Plus < Tier::Tier2);
    }
}
