//! The deterministic routing override chain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use aluskort_persistence::{publish_audit, MessageBus};
use aluskort_schemas::{
    Actor, ActorType, AuditEventEnvelope, AuditEventType, AuditSeverity, Severity, TenantTier,
};

use crate::breaker::BreakerState;
use crate::escalation::EscalationBudget;
use crate::health::{DegradationPolicy, ProviderHealthRegistry};
use crate::metrics::ROUTING_METRICS;
use crate::registry::{default_fallbacks, default_registry, ModelSpec, TaskKind, Tier};

/// Inputs to one routing decision.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    pub task: TaskKind,
    pub tenant_id: String,
    pub tenant_tier: TenantTier,
    pub severity: Severity,
    /// Remaining wall-clock budget for the call
    pub time_budget_s: f64,
    /// Prompt context size
    pub context_tokens: u64,
    /// Prior confidence, if re-running
    pub confidence: Option<f64>,
}

/// The routing outcome handed to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub task: TaskKind,
    pub tier: Tier,
    pub model: ModelSpec,
    pub fallback_configs: Vec<ModelSpec>,
    pub is_fallback: bool,
    /// Every applied override, in order
    pub reason: Vec<String>,
    /// Advisory; enforcement is the orchestrator's job
    pub degradation_policy: DegradationPolicy,
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Tier0 => "tier0",
        Tier::Tier1 => "tier1",
        Tier::Tier1Plus => "tier1plus",
        Tier::Tier2 => "tier2",
    }
}

/// Model router with optional health awareness.
pub struct ModelRouter {
    registry: HashMap<Tier, ModelSpec>,
    fallbacks: HashMap<Tier, Vec<ModelSpec>>,
    health: Option<Arc<ProviderHealthRegistry>>,
    escalation: Arc<EscalationBudget>,
    bus: Option<Arc<dyn MessageBus>>,
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(default_registry(), default_fallbacks())
    }
}

impl ModelRouter {
    pub fn new(registry: HashMap<Tier, ModelSpec>, fallbacks: HashMap<Tier, Vec<ModelSpec>>) -> Self {
        Self {
            registry,
            fallbacks,
            health: None,
            escalation: Arc::new(EscalationBudget::default()),
            bus: None,
        }
    }

    pub fn with_health_registry(mut self, health: Arc<ProviderHealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_escalation_budget(mut self, budget: Arc<EscalationBudget>) -> Self {
        self.escalation = budget;
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn escalation_budget(&self) -> Arc<EscalationBudget> {
        self.escalation.clone()
    }

    /// Run the override chain for one task.
    pub async fn route(&self, ctx: &RoutingContext) -> RoutingDecision {
        let caps = ctx.task.capabilities();
        let mut reason = Vec::new();

        // 1. Base tier from the task map
        let mut tier = ctx.task.base_tier();
        reason.push(format!("base_tier({})", tier_name(tier)));

        // 2. Tight time budget forces tier-0
        if ctx.time_budget_s < 3.0 {
            tier = Tier::Tier0;
            reason.push("time_budget<3s→tier0".into());
        } else {
            // 3. Critical severity on a reasoning task floors at tier-1
            if ctx.severity == Severity::Critical && ctx.task.requires_reasoning() && tier < Tier::Tier1 {
                tier = Tier::Tier1;
                reason.push("critical_reasoning→tier1".into());
            }
            // 4. Large context floors at tier-1
            if ctx.context_tokens > 100_000 && tier < Tier::Tier1 {
                tier = Tier::Tier1;
                reason.push("context>100k→tier1".into());
            }
            // 5. Low confidence on critical/high escalates to tier-1+,
            //    subject to the escalation budget
            if let Some(conf) = ctx.confidence {
                if conf < 0.6 && ctx.severity.is_high_or_critical() && tier < Tier::Tier1Plus {
                    if self.escalation.try_escalate() {
                        tier = Tier::Tier1Plus;
                        reason.push("low_confidence→tier1plus".into());
                        ROUTING_METRICS.record_escalation(true);
                    } else {
                        reason.push("escalation_budget_exhausted".into());
                        ROUTING_METRICS.record_escalation(false);
                    }
                }
            }
        }

        // 6. Capability match: walk down the fallback chain until eligible
        let mut model = self.registry[&tier].clone();
        let mut is_fallback = false;
        if !model.satisfies(&caps) {
            let mut found = false;
            for candidate in self.fallbacks.get(&tier).into_iter().flatten() {
                if candidate.satisfies(&caps) {
                    reason.push(format!("capability_mismatch→{}", candidate.model_id));
                    model = candidate.clone();
                    is_fallback = true;
                    found = true;
                    break;
                }
            }
            if !found {
                // Log-only when nothing eligible remains; the call will fail
                // loudly at the provider if the capability truly matters.
                tracing::warn!(
                    task = ctx.task.as_str(),
                    model = %model.model_id,
                    "no capability-compatible model; keeping primary"
                );
                reason.push("capability_mismatch_unresolved".into());
            }
        }

        // 7. Fallback configs for the chosen tier
        let fallback_configs = self.fallbacks.get(&tier).cloned().unwrap_or_default();

        // 8. Health-aware swap when the chosen provider's breaker is open
        if let Some(health) = &self.health {
            if health.breaker(&model.provider).current_state() == BreakerState::Open {
                let healthy_fallback = fallback_configs.iter().find(|fb| {
                    fb.satisfies(&caps)
                        && health.breaker(&fb.provider).current_state() != BreakerState::Open
                });
                if let Some(fb) = healthy_fallback {
                    reason.push(format!("primary_unavailable→fallback({})", fb.provider));
                    model = fb.clone();
                    is_fallback = true;
                    self.emit_failover(ctx, &model).await;
                } else {
                    reason.push("primary_unavailable_no_fallback".into());
                }
            }
        }

        // 9. Metrics
        ROUTING_METRICS.record_decision(&model.provider, tier_name(tier), is_fallback);

        let degradation_policy = self
            .health
            .as_ref()
            .map(|h| h.policy())
            .unwrap_or_else(|| DegradationPolicy::for_level(crate::health::DegradationLevel::FullCapability));

        RoutingDecision {
            task: ctx.task,
            tier,
            model,
            fallback_configs,
            is_fallback,
            reason,
            degradation_policy,
        }
    }

    async fn emit_failover(&self, ctx: &RoutingContext, fallback: &ModelSpec) {
        let Some(bus) = &self.bus else { return };
        let envelope = AuditEventEnvelope::new(
            ctx.tenant_id.clone(),
            "router",
            AuditEventType::ProviderFailover,
            AuditSeverity::Warning,
            Actor {
                actor_type: ActorType::System,
                id: "model-router".into(),
                permissions: vec![],
            },
        )
        .with_decision(serde_json::json!({
            "task": ctx.task.as_str(),
            "fallback_provider": fallback.provider,
            "fallback_model": fallback.model_id,
        }));
        if let Err(e) = publish_audit(bus.as_ref(), &envelope).await {
            tracing::error!(error = %e, "failed to publish provider_failover audit event");
        }
    }
}
