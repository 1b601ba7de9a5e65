//! The investigation pipeline.
//!
//! `received → parsing → fp_check → {closed | enriching} → reasoning →
//! {responding | awaiting_human | closed}`, with `failed` reachable from any
//! non-terminal state. Every transition emits an audit event; the FP
//! short-circuit and action execution run under the executor constraints.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use aluskort_gateway::{ContextGateway, GatewayRequest, TierBudget};
use aluskort_governance::{FpMatcher, KillSwitchManager, KillSwitchScope, PatternGovernance, ShadowModeManager};
use aluskort_observability::AgreementTracker;
use aluskort_persistence::{publish_audit, topics, MessageBus};
use aluskort_router::{ModelRouter, ProviderHealthRegistry, RoutingContext, TaskKind, Tier};
use aluskort_schemas::{
    Actor, ActorType, AttestationStatus, AuditContext, AuditEventEnvelope, AuditEventType,
    AuditSeverity, CanonicalAlert, Classification, GraphState, InvestigationState,
    RecommendedAction, Severity, TenantTier,
};

use crate::approval::{ApprovalGateManager, ApprovalOutcome};
use crate::arena::{InvestigationArena, SlotId};
use crate::constraints::{AgentRole, ExecutorConstraints};
use crate::enrichment::{run_enrichment, Enricher};
use crate::error::OrchestratorError;

/// Orchestrator policy knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub taxonomy_version: String,
    /// Below this, classification routes to a human even outside shadow
    pub auto_close_confidence: f64,
    /// Below this on critical/high, re-run at the top tier
    pub escalation_confidence: f64,
    pub enricher_timeout: Duration,
    pub default_time_budget_s: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            taxonomy_version: "2026-07".into(),
            auto_close_confidence: 0.85,
            escalation_confidence: 0.6,
            enricher_timeout: Duration::from_secs(20),
            default_time_budget_s: 60.0,
        }
    }
}

/// What the reasoning model is expected to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningVerdict {
    pub classification: Classification,
    pub confidence: f64,
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
    #[serde(default)]
    pub risk_state: Option<String>,
}

impl ReasoningVerdict {
    /// Parse from model output, tolerating prose around the JSON object.
    pub fn parse(content: &str) -> Option<Self> {
        let start = content.find('{')?;
        let end = content.rfind('}')?;
        serde_json::from_str(&content[start..=end]).ok()
    }
}

/// The investigation orchestrator.
pub struct Orchestrator {
    config: OrchestratorConfig,
    gateway: Arc<ContextGateway>,
    router: Arc<ModelRouter>,
    health: Option<Arc<ProviderHealthRegistry>>,
    matcher: FpMatcher,
    governance: Arc<PatternGovernance>,
    kill_switches: Arc<KillSwitchManager>,
    shadow: Arc<ShadowModeManager>,
    agreement: Arc<AgreementTracker>,
    approvals: Arc<ApprovalGateManager>,
    constraints: ExecutorConstraints,
    enrichers: Vec<Arc<dyn Enricher>>,
    arena: InvestigationArena,
    slots_by_investigation: RwLock<HashMap<Uuid, SlotId>>,
    tenant_tiers: RwLock<HashMap<String, TenantTier>>,
    bus: Arc<dyn MessageBus>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        gateway: Arc<ContextGateway>,
        router: Arc<ModelRouter>,
        health: Option<Arc<ProviderHealthRegistry>>,
        matcher: FpMatcher,
        governance: Arc<PatternGovernance>,
        kill_switches: Arc<KillSwitchManager>,
        shadow: Arc<ShadowModeManager>,
        agreement: Arc<AgreementTracker>,
        approvals: Arc<ApprovalGateManager>,
        constraints: ExecutorConstraints,
        enrichers: Vec<Arc<dyn Enricher>>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            config,
            gateway,
            router,
            health,
            matcher,
            governance,
            kill_switches,
            shadow,
            agreement,
            approvals,
            constraints,
            enrichers,
            arena: InvestigationArena::new(),
            slots_by_investigation: RwLock::new(HashMap::new()),
            tenant_tiers: RwLock::new(HashMap::new()),
            bus,
        }
    }

    pub fn set_tenant_tier(&self, tenant_id: &str, tier: TenantTier) {
        self.tenant_tiers.write().insert(tenant_id.to_string(), tier);
    }

    fn tenant_tier(&self, tenant_id: &str) -> TenantTier {
        self.tenant_tiers
            .read()
            .get(tenant_id)
            .copied()
            .unwrap_or(TenantTier::Standard)
    }

    pub fn approvals(&self) -> Arc<ApprovalGateManager> {
        self.approvals.clone()
    }

    pub fn live_investigations(&self) -> usize {
        self.arena.live_count()
    }

    /// Drive one alert to a terminal or waiting state.
    pub async fn run_investigation(&self, alert: &CanonicalAlert) -> Result<GraphState, OrchestratorError> {
        alert.validate()?;
        let state = GraphState::new(&alert.alert_id, &alert.tenant_id, alert.severity);
        let investigation_id = state.investigation_id;
        let (slot, handle) = self.arena.insert(state);
        self.slots_by_investigation
            .write()
            .insert(investigation_id, slot);

        let result = {
            let mut state = handle.lock().await;
            self.drive(&mut state, alert).await
        };

        match result {
            Ok(()) => {
                let state = handle.lock().await;
                let snapshot = state.clone();
                drop(state);
                if snapshot.state.is_terminal() {
                    self.arena.release(slot);
                    self.slots_by_investigation.write().remove(&investigation_id);
                }
                Ok(snapshot)
            }
            Err(e) => {
                // Unrecoverable: transition to failed, record, audit, release.
                let mut state = handle.lock().await;
                let reason = e.to_string();
                if state
                    .transition(
                        InvestigationState::Failed,
                        "orchestrator",
                        &self.config.taxonomy_version,
                        AttestationStatus::NotApplicable,
                        serde_json::json!({"error": reason}),
                    )
                    .is_ok()
                {
                    self.emit(
                        &state,
                        AuditEventType::InvestigationFailed,
                        AuditSeverity::Critical,
                        serde_json::json!({"error": reason}),
                    )
                    .await;
                }
                let snapshot = state.clone();
                drop(state);
                self.arena.release(slot);
                self.slots_by_investigation.write().remove(&investigation_id);
                tracing::error!(investigation_id = %investigation_id, error = %reason, "investigation failed");
                Ok(snapshot)
            }
        }
    }

    async fn drive(&self, state: &mut GraphState, alert: &CanonicalAlert) -> Result<(), OrchestratorError> {
        self.emit(
            state,
            AuditEventType::AlertReceived,
            AuditSeverity::Info,
            serde_json::json!({"source": alert.source, "severity": alert.severity}),
        )
        .await;

        // received -> parsing
        self.transition(state, InvestigationState::Parsing, serde_json::Value::Null)
            .await?;
        self.parse_entities(state, alert);
        self.emit(
            state,
            AuditEventType::AlertParsed,
            AuditSeverity::Info,
            serde_json::json!({"entity_types": state.entities.len()}),
        )
        .await;

        // parsing -> fp_check
        self.transition(state, InvestigationState::FpCheck, serde_json::Value::Null)
            .await?;
        if self.try_fp_short_circuit(state, alert).await? {
            return Ok(());
        }

        // fp_check -> enriching
        self.transition(state, InvestigationState::Enriching, serde_json::Value::Null)
            .await?;
        let succeeded = run_enrichment(
            state,
            &self.enrichers,
            self.config.enricher_timeout,
            &self.config.taxonomy_version,
        )
        .await;
        self.emit(
            state,
            AuditEventType::EnrichmentCompleted,
            AuditSeverity::Info,
            serde_json::json!({"succeeded": succeeded, "attempted": self.enrichers.len()}),
        )
        .await;

        // enriching -> reasoning
        self.transition(state, InvestigationState::Reasoning, serde_json::Value::Null)
            .await?;
        self.reason(state, alert).await?;

        // Edge telemetry trust: all-untrusted ATLAS support forces a human.
        if state.all_atlas_untrusted() {
            state.requires_human_approval = true;
            self.emit(
                state,
                AuditEventType::UntrustedTelemetry,
                AuditSeverity::Warning,
                serde_json::json!({"atlas_matches": state.atlas_matches.len()}),
            )
            .await;
        }

        self.respond(state, alert).await
    }

    fn parse_entities(&self, state: &mut GraphState, alert: &CanonicalAlert) {
        // Structured entities when the product sent JSON; indicator
        // extraction from the description either way.
        if let Ok(parsed) = serde_json::from_str::<HashMap<String, serde_json::Value>>(&alert.raw_entities) {
            for (kind, value) in parsed {
                let values = match value {
                    serde_json::Value::String(s) => vec![s],
                    serde_json::Value::Array(items) => items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect(),
                    other => vec![other.to_string()],
                };
                state.entities.entry(kind).or_default().extend(values);
            }
        }
        let extracted = aluskort_gateway::extract_entities(&alert.description);
        if !extracted.ips.is_empty() {
            state.entities.entry("ip".into()).or_default().extend(extracted.ips.clone());
        }
        if !extracted.hashes.is_empty() {
            state.entities.entry("hash".into()).or_default().extend(extracted.hashes.clone());
        }
        if !extracted.domains.is_empty() {
            state.entities.entry("domain".into()).or_default().extend(extracted.domains.clone());
        }
        state.case_facts.entities = state.entities.clone();
        state.case_facts.techniques = alert.techniques.clone();
    }

    /// FP short-circuit: kill switches gate the whole check; a governed
    /// match above the effective threshold closes the investigation without
    /// enrichment or reasoning.
    async fn try_fp_short_circuit(
        &self,
        state: &mut GraphState,
        alert: &CanonicalAlert,
    ) -> Result<bool, OrchestratorError> {
        let degradation = self.health.as_ref().map(|h| h.policy());
        let patterns = self.governance.all();

        let scope = KillSwitchScope {
            tenant_id: Some(state.tenant_id.clone()),
            pattern_id: None,
            techniques: alert.techniques.clone(),
            data_source: Some(alert.source.clone()),
        };
        if self.kill_switches.is_suppressed(&scope).await {
            tracing::info!(tenant_id = %state.tenant_id, "fp short-circuit suppressed by kill switch");
            return Ok(false);
        }

        let Some(fp_match) = self.matcher.best_match(
            state,
            &alert.title,
            None,
            None,
            &patterns,
            degradation.as_ref(),
        ) else {
            return Ok(false);
        };

        // Pattern-dimension switch checked with the concrete match in hand.
        let pattern_scope = KillSwitchScope {
            pattern_id: Some(fp_match.pattern_id.clone()),
            ..Default::default()
        };
        if self.kill_switches.is_suppressed(&pattern_scope).await {
            return Ok(false);
        }

        state.fp_matched = true;
        state.fp_pattern_id = Some(fp_match.pattern_id.clone());
        state.confidence = fp_match.confidence;
        state.classification = Some(Classification::FalsePositive);

        if let Some(policy) = &degradation {
            if !policy.auto_close_allowed {
                tracing::warn!("degradation policy forbids auto-close; routing to human");
                return Ok(false);
            }
        }
        if let Err(block) = self.constraints.check_auto_close(state, AgentRole::FpGovernor) {
            self.emit_blocked(state, &block).await;
            return Ok(false);
        }

        self.transition(
            state,
            InvestigationState::Closed,
            serde_json::json!({
                "pattern_id": fp_match.pattern_id,
                "confidence": fp_match.confidence,
                "effective_threshold": fp_match.effective_threshold,
            }),
        )
        .await?;
        self.emit(
            state,
            AuditEventType::AlertShortCircuited,
            AuditSeverity::Info,
            serde_json::json!({
                "pattern_id": fp_match.pattern_id,
                "confidence": fp_match.confidence,
            }),
        )
        .await;
        Ok(true)
    }

    fn tier_budget(tier: Tier) -> TierBudget {
        match tier {
            Tier::Tier0 => TierBudget::Tier0,
            Tier::Tier1 => TierBudget::Tier1,
            Tier::Tier1Plus | Tier::Tier2 => TierBudget::Tier1Plus,
        }
    }

    async fn call_reasoning(
        &self,
        state: &mut GraphState,
        alert: &CanonicalAlert,
        confidence_hint: Option<f64>,
    ) -> Result<Option<ReasoningVerdict>, OrchestratorError> {
        let routing = self
            .router
            .route(&RoutingContext {
                task: TaskKind::AlertClassification,
                tenant_id: state.tenant_id.clone(),
                tenant_tier: self.tenant_tier(&state.tenant_id),
                severity: state.severity,
                time_budget_s: self.config.default_time_budget_s,
                context_tokens: (alert.description.len() / 4) as u64,
                confidence: confidence_hint,
            })
            .await;

        let retrieval: Vec<String> = state
            .similar_incidents
            .iter()
            .map(|i| {
                format!(
                    "incident {} (similarity {:.2}): {}",
                    i.incident_id,
                    i.similarity,
                    i.resolution.as_deref().unwrap_or("unresolved")
                )
            })
            .collect();

        let response = self
            .gateway
            .call(GatewayRequest {
                tenant_id: state.tenant_id.clone(),
                investigation_id: state.investigation_id,
                system_instructions: format!(
                    "Classify this SOC alert. Respond with JSON: \
                     {{\"classification\": \"true_positive|false_positive|suspicious|benign\", \
                     \"confidence\": 0.0-1.0, \"recommended_actions\": \
                     [{{\"playbook_id\": \"...\", \"description\": \"...\", \"tier\": 0}}], \
                     \"risk_state\": \"...\"}}. Severity: {}. Techniques: {}.",
                    state.severity.as_str(),
                    alert.techniques.join(", "),
                ),
                untrusted_fields: vec![
                    ("title".into(), alert.title.clone()),
                    ("description".into(), alert.description.clone()),
                ],
                retrieval_context: retrieval,
                tier: Self::tier_budget(routing.tier),
                provider: routing.model.provider.clone(),
                model_id: routing.model.model_id.clone(),
                json_output: true,
            })
            .await?;

        state.llm_calls += 1;
        state.total_cost_usd += response.metrics.cost_usd;
        state.append_note(
            "agent.reasoning",
            &self.config.taxonomy_version,
            AttestationStatus::NotApplicable,
            serde_json::json!({
                "tier": routing.tier,
                "model": routing.model.model_id,
                "prompt_hash": response.metrics.prompt_hash,
                "quarantined_ids": response.quarantined_ids,
            }),
        );

        Ok(ReasoningVerdict::parse(&response.content))
    }

    async fn reason(&self, state: &mut GraphState, alert: &CanonicalAlert) -> Result<(), OrchestratorError> {
        let Some(mut verdict) = self.call_reasoning(state, alert, None).await? else {
            // Unparseable output is not a safety violation but it is not a
            // decision either; a human takes it from here.
            state.requires_human_approval = true;
            state.confidence = 0.0;
            return Ok(());
        };

        // Escalate on low-confidence critical/high, keeping the better run.
        if verdict.confidence < self.config.escalation_confidence
            && state.severity.is_high_or_critical()
        {
            if let Some(second) = self
                .call_reasoning(state, alert, Some(verdict.confidence))
                .await?
            {
                if second.confidence > verdict.confidence {
                    verdict = second;
                }
                self.emit(
                    state,
                    AuditEventType::DecisionEscalated,
                    AuditSeverity::Info,
                    serde_json::json!({"final_confidence": verdict.confidence}),
                )
                .await;
            }
        }

        state.classification = Some(verdict.classification);
        state.confidence = verdict.confidence;
        state.recommended_actions = verdict.recommended_actions;
        state.risk_state = verdict.risk_state;
        self.emit(
            state,
            AuditEventType::DecisionClassified,
            AuditSeverity::Info,
            serde_json::json!({
                "classification": verdict.classification,
                "confidence": verdict.confidence,
                "actions": state.recommended_actions.len(),
            }),
        )
        .await;
        Ok(())
    }

    async fn respond(&self, state: &mut GraphState, alert: &CanonicalAlert) -> Result<(), OrchestratorError> {
        // Shadow tenants: record the decision, skip execution, wait for the
        // analyst. Agreement is computed from the pairing later.
        if self.shadow.is_shadow(&state.tenant_id) {
            let decision = state
                .classification
                .map(|c| serde_json::to_string(&c).unwrap_or_default())
                .unwrap_or_else(|| "undetermined".into());
            self.agreement.record_shadow(
                state.investigation_id,
                &state.tenant_id,
                None,
                decision.trim_matches('"'),
            );
            self.emit(
                state,
                AuditEventType::ShadowRecorded,
                AuditSeverity::Info,
                serde_json::json!({"classification": state.classification}),
            )
            .await;
            self.emit(
                state,
                AuditEventType::ActionSkippedShadow,
                AuditSeverity::Info,
                serde_json::json!({"actions": state.recommended_actions.len()}),
            )
            .await;
            state.requires_human_approval = true;
            self.transition(state, InvestigationState::AwaitingHuman, serde_json::json!({"shadow": true}))
                .await?;
            return Ok(());
        }

        let needs_gate = state
            .recommended_actions
            .iter()
            .any(|a| self.approvals.requires_approval(a));
        let below_bar = state.confidence < self.config.auto_close_confidence;

        if needs_gate || below_bar || state.requires_human_approval {
            state.requires_human_approval = true;
            for action in state
                .recommended_actions
                .clone()
                .into_iter()
                .filter(|a| self.approvals.requires_approval(a))
            {
                let gate = self.approvals.open(
                    state.investigation_id,
                    &state.tenant_id,
                    action.clone(),
                    state.severity,
                );
                self.emit(
                    state,
                    AuditEventType::ApprovalRequested,
                    AuditSeverity::Info,
                    serde_json::json!({
                        "gate_id": gate.gate_id,
                        "playbook_id": action.playbook_id,
                        "deadline": gate.deadline,
                    }),
                )
                .await;
            }
            self.transition(state, InvestigationState::AwaitingHuman, serde_json::Value::Null)
                .await?;
            return Ok(());
        }

        // responding: execute sub-threshold actions under constraints
        self.transition(state, InvestigationState::Responding, serde_json::Value::Null)
            .await?;
        for action in state.recommended_actions.clone() {
            match self.constraints.check_action(&action, AgentRole::Response) {
                Ok(()) => {
                    let payload = serde_json::json!({
                        "investigation_id": state.investigation_id,
                        "tenant_id": state.tenant_id,
                        "playbook_id": action.playbook_id,
                        "alert_id": alert.alert_id,
                    });
                    self.bus
                        .publish(
                            topics::ACTIONS_PENDING,
                            &state.tenant_id,
                            serde_json::to_vec(&payload).map_err(|e| {
                                OrchestratorError::Unrecoverable(e.to_string())
                            })?,
                        )
                        .await?;
                    self.emit(
                        state,
                        AuditEventType::ActionExecuted,
                        AuditSeverity::Info,
                        serde_json::json!({"playbook_id": action.playbook_id}),
                    )
                    .await;
                }
                Err(block) => {
                    self.emit_blocked(state, &block).await;
                }
            }
        }

        self.transition(state, InvestigationState::Closed, serde_json::Value::Null)
            .await?;
        Ok(())
    }

    /// Sweep approval gates: fire due escalation signals and apply expiry
    /// semantics to overdue gates.
    pub async fn sweep_approvals(&self) -> Result<(), OrchestratorError> {
        let now = Utc::now();
        for gate in self.approvals.due_escalation_signals(now) {
            if let Some(handle) = self.handle_for(gate.investigation_id) {
                let state = handle.lock().await;
                self.emit(
                    &state,
                    AuditEventType::ApprovalEscalationSignaled,
                    AuditSeverity::Warning,
                    serde_json::json!({"gate_id": gate.gate_id}),
                )
                .await;
            }
        }

        for gate in self.approvals.expire_due(now) {
            let Some(handle) = self.handle_for(gate.investigation_id) else {
                continue;
            };
            let mut state = handle.lock().await;
            match gate.outcome {
                ApprovalOutcome::Escalated => {
                    state.classification = Some(Classification::Escalated);
                    state.append_note(
                        "approval-gate",
                        &self.config.taxonomy_version,
                        AttestationStatus::NotApplicable,
                        serde_json::json!({"gate_id": gate.gate_id, "outcome": "escalated"}),
                    );
                    self.emit(
                        &state,
                        AuditEventType::ApprovalExpired,
                        AuditSeverity::Critical,
                        serde_json::json!({"gate_id": gate.gate_id, "escalated": true}),
                    )
                    .await;
                    // Stays open in awaiting_human.
                }
                ApprovalOutcome::ExpiredRejected => {
                    self.emit(
                        &state,
                        AuditEventType::ApprovalExpired,
                        AuditSeverity::Warning,
                        serde_json::json!({"gate_id": gate.gate_id, "escalated": false}),
                    )
                    .await;
                    let investigation_id = state.investigation_id;
                    if state.state == InvestigationState::AwaitingHuman {
                        self.transition(
                            &mut state,
                            InvestigationState::Closed,
                            serde_json::json!({"resolution": "rejected_on_expiry"}),
                        )
                        .await?;
                        drop(state);
                        if let Some(slot) = self
                            .slots_by_investigation
                            .write()
                            .remove(&investigation_id)
                        {
                            self.arena.release(slot);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_for(&self, investigation_id: Uuid) -> Option<Arc<tokio::sync::Mutex<GraphState>>> {
        let slot = *self.slots_by_investigation.read().get(&investigation_id)?;
        self.arena.get(slot)
    }

    async fn transition(
        &self,
        state: &mut GraphState,
        next: InvestigationState,
        details: serde_json::Value,
    ) -> Result<(), OrchestratorError> {
        let attestation = if state.all_atlas_untrusted() {
            AttestationStatus::Untrusted
        } else if state.atlas_matches.is_empty() {
            AttestationStatus::NotApplicable
        } else {
            AttestationStatus::Mixed
        };
        state.transition(next, "orchestrator", &self.config.taxonomy_version, attestation, details)?;
        self.emit(
            state,
            AuditEventType::StateTransition,
            AuditSeverity::Info,
            serde_json::json!({"to": next.as_str()}),
        )
        .await;
        Ok(())
    }

    async fn emit_blocked(&self, state: &GraphState, block: &crate::constraints::ConstraintBlock) {
        tracing::warn!(
            investigation_id = %state.investigation_id,
            constraint_blocked_type = block.as_str(),
            "executor constraint blocked action"
        );
        self.emit(
            state,
            AuditEventType::ConstraintBlocked,
            AuditSeverity::Warning,
            serde_json::json!({"constraint_blocked_type": block.as_str()}),
        )
        .await;
    }

    async fn emit(
        &self,
        state: &GraphState,
        event_type: AuditEventType,
        severity: AuditSeverity,
        decision: serde_json::Value,
    ) {
        let envelope = AuditEventEnvelope::new(
            state.tenant_id.clone(),
            "orchestrator",
            event_type,
            severity,
            Actor {
                actor_type: ActorType::Agent,
                id: "orchestrator".into(),
                permissions: vec![],
            },
        )
        .with_investigation(state.investigation_id)
        .with_alert(state.alert_id.clone())
        .with_decision(decision)
        .with_context(AuditContext {
            taxonomy_version: Some(self.config.taxonomy_version.clone()),
            ..Default::default()
        });
        if let Err(e) = publish_audit(self.bus.as_ref(), &envelope).await {
            tracing::error!(error = %e, "orchestrator audit emission failed");
        }
    }
}

/// Record an analyst decision against a shadow investigation and return the
/// updated agreement rate for the tenant.
pub fn record_analyst_decision(
    agreement: &AgreementTracker,
    investigation_id: Uuid,
    decision: &str,
) -> bool {
    agreement.record_analyst(investigation_id, decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalGateManager;
    use crate::enrichment::EnrichmentOutput;
    use aluskort_gateway::{
        InjectionClassifier, ModelInvoker, ModelOutput, ProviderRequest, SpendGuard,
        TaxonomySource, TechniqueValidator,
    };
    use aluskort_governance::PatternGovernance;
    use aluskort_observability::ThresholdAdjuster;
    use aluskort_persistence::{InMemoryBus, MemoryCache};
    use aluskort_schemas::{ActionTier, EntityMatcher, FpPattern, PatternStatus};
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct ScriptedModel {
        verdict: serde_json::Value,
    }

    #[async_trait]
    impl ModelInvoker for ScriptedModel {
        async fn invoke(&self, request: ProviderRequest) -> Result<ModelOutput, String> {
            Ok(ModelOutput {
                content: self.verdict.to_string(),
                tokens_in: 200,
                tokens_out: 80,
                cost_usd: 0.02,
                provider: request.provider,
                model_id: request.model_id,
            })
        }
    }

    struct OpenTaxonomy;

    #[async_trait]
    impl TaxonomySource for OpenTaxonomy {
        async fn load(&self) -> Result<(HashSet<String>, String), String> {
            Ok((
                ["T1059", "T1078", "AML.T0051"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                "2026-07".into(),
            ))
        }
    }

    struct NoopEnricher;

    #[async_trait]
    impl Enricher for NoopEnricher {
        fn name(&self) -> &'static str {
            "ueba"
        }

        async fn enrich(&self, _state: &GraphState) -> Result<EnrichmentOutput, String> {
            Ok(EnrichmentOutput::default())
        }
    }

    fn alert(severity: Severity) -> CanonicalAlert {
        CanonicalAlert {
            alert_id: "a1".into(),
            tenant_id: "t1".into(),
            source: "sentinel".into(),
            product: "defender".into(),
            timestamp: Utc::now(),
            title: "Scheduled scan completed".into(),
            description: "Routine scan from 10.0.0.1 finished.".into(),
            severity,
            tactics: vec![],
            techniques: vec!["T1059".into()],
            raw_entities: r#"{"ip": "10.0.0.1"}"#.into(),
            original_payload: serde_json::Value::Null,
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        bus: Arc<InMemoryBus>,
        governance: Arc<PatternGovernance>,
        shadow: Arc<ShadowModeManager>,
        agreement: Arc<AgreementTracker>,
    }

    fn fixture(verdict: serde_json::Value) -> Fixture {
        let bus = Arc::new(InMemoryBus::new());
        let cache = Arc::new(MemoryCache::new());
        let adjuster = Arc::new(ThresholdAdjuster::new());
        let agreement = Arc::new(AgreementTracker::new());
        let governance = Arc::new(PatternGovernance::new(cache.clone(), bus.clone()));
        let shadow = Arc::new(ShadowModeManager::new(false, agreement.clone(), bus.clone()));

        let gateway = Arc::new(ContextGateway::new(
            InjectionClassifier::new(),
            TechniqueValidator::new(Box::new(OpenTaxonomy), Duration::from_secs(300)),
            SpendGuard::new(5_000.0, 10_000.0),
            Arc::new(ScriptedModel { verdict }),
            bus.clone(),
            [3u8; 32],
        ));

        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            gateway,
            Arc::new(ModelRouter::default()),
            None,
            FpMatcher::new(adjuster),
            governance.clone(),
            Arc::new(KillSwitchManager::new(cache.clone(), bus.clone())),
            shadow.clone(),
            agreement.clone(),
            Arc::new(ApprovalGateManager::new(ActionTier(2))),
            ExecutorConstraints::default().with_allowlist(&["pb-notify", "pb-isolate-host"]),
            vec![Arc::new(NoopEnricher)],
            bus.clone(),
        );

        Fixture {
            orchestrator,
            bus,
            governance,
            shadow,
            agreement,
        }
    }

    fn benign_verdict() -> serde_json::Value {
        serde_json::json!({
            "classification": "benign",
            "confidence": 0.95,
            "recommended_actions": [],
            "risk_state": "low"
        })
    }

    async fn audit_event_types(bus: &InMemoryBus) -> Vec<String> {
        bus.poll(topics::AUDIT_EVENTS, "test", 1000)
            .await
            .unwrap()
            .iter()
            .map(|m| {
                serde_json::from_slice::<AuditEventEnvelope>(&m.payload)
                    .unwrap()
                    .event_type
                    .as_str()
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_pipeline_closes_benign_alert() {
        let f = fixture(benign_verdict());
        let state = f.orchestrator.run_investigation(&alert(Severity::Low)).await.unwrap();
        assert_eq!(state.state, InvestigationState::Closed);
        assert_eq!(state.classification, Some(Classification::Benign));
        assert_eq!(f.orchestrator.live_investigations(), 0, "arena slot released");

        let events = audit_event_types(&f.bus).await;
        assert!(events.contains(&"alert.received".to_string()));
        assert!(events.contains(&"decision.classified".to_string()));
        assert!(events.contains(&"decision.state_transition".to_string()));
    }

    #[tokio::test]
    async fn test_fp_short_circuit_scenario() {
        let f = fixture(benign_verdict());
        // Active pattern fp-001, empty scope, matching name and CIDR
        let pattern = FpPattern::new("fp-001")
            .with_alert_names(vec!["Scheduled scan completed".into()])
            .with_entity_matchers(vec![EntityMatcher::Cidr("10.0.0.0/8".into())]);
        f.governance.submit(pattern).await;
        f.governance.approve("fp-001", "alice").await.unwrap();
        f.governance.approve("fp-001", "bob").await.unwrap();

        let state = f.orchestrator.run_investigation(&alert(Severity::Low)).await.unwrap();
        assert_eq!(state.state, InvestigationState::Closed);
        assert!(state.fp_matched);
        assert_eq!(state.fp_pattern_id.as_deref(), Some("fp-001"));
        assert!(state.confidence >= 0.90);
        assert_eq!(state.llm_calls, 0, "short-circuit skips reasoning");

        let events = audit_event_types(&f.bus).await;
        assert!(events.contains(&"alert.short_circuited".to_string()));
    }

    #[tokio::test]
    async fn test_kill_switch_suppresses_short_circuit() {
        let f = fixture(benign_verdict());
        let pattern = FpPattern::new("fp-001")
            .with_alert_names(vec!["Scheduled scan completed".into()])
            .with_status(PatternStatus::Active);
        f.governance.submit(pattern).await;
        f.governance.approve("fp-001", "alice").await.unwrap();
        f.governance.approve("fp-001", "bob").await.unwrap();

        f.orchestrator
            .kill_switches
            .activate(
                aluskort_governance::KillSwitchDimension::Tenant,
                "t1",
                "oncall",
                "precision regression",
            )
            .await;

        let state = f.orchestrator.run_investigation(&alert(Severity::Low)).await.unwrap();
        assert!(!state.fp_matched, "kill switch must suppress the match");
        assert!(state.llm_calls > 0, "pipeline continued to reasoning");
    }

    #[tokio::test]
    async fn test_high_tier_action_routes_to_human() {
        let f = fixture(serde_json::json!({
            "classification": "true_positive",
            "confidence": 0.92,
            "recommended_actions": [
                {"playbook_id": "pb-isolate-host", "description": "Isolate", "tier": 2}
            ],
            "risk_state": "elevated"
        }));
        let state = f.orchestrator.run_investigation(&alert(Severity::Critical)).await.unwrap();
        assert_eq!(state.state, InvestigationState::AwaitingHuman);
        assert!(state.requires_human_approval);

        let events = audit_event_types(&f.bus).await;
        assert!(events.contains(&"approval.requested".to_string()));
    }

    #[tokio::test]
    async fn test_low_tier_actions_execute_and_close() {
        let f = fixture(serde_json::json!({
            "classification": "true_positive",
            "confidence": 0.92,
            "recommended_actions": [
                {"playbook_id": "pb-notify", "description": "Notify owner", "tier": 1}
            ],
            "risk_state": "low"
        }));
        let state = f.orchestrator.run_investigation(&alert(Severity::Medium)).await.unwrap();
        assert_eq!(state.state, InvestigationState::Closed);
        assert_eq!(f.bus.len(topics::ACTIONS_PENDING), 1);

        let events = audit_event_types(&f.bus).await;
        assert!(events.contains(&"action.executed".to_string()));
    }

    #[tokio::test]
    async fn test_disallowed_playbook_blocked_not_raised() {
        let f = fixture(serde_json::json!({
            "classification": "true_positive",
            "confidence": 0.92,
            "recommended_actions": [
                {"playbook_id": "pb-wipe-disk", "description": "Nope", "tier": 1}
            ],
            "risk_state": "low"
        }));
        let state = f.orchestrator.run_investigation(&alert(Severity::Medium)).await.unwrap();
        // Blocked action does not fail the investigation
        assert_eq!(state.state, InvestigationState::Closed);
        assert_eq!(f.bus.len(topics::ACTIONS_PENDING), 0);

        let events = audit_event_types(&f.bus).await;
        assert!(events.contains(&"constraint.blocked".to_string()));
    }

    #[tokio::test]
    async fn test_untrusted_atlas_forces_human() {
        struct UntrustedAtlas;

        #[async_trait]
        impl Enricher for UntrustedAtlas {
            fn name(&self) -> &'static str {
                "atlas"
            }

            async fn enrich(&self, _state: &GraphState) -> Result<EnrichmentOutput, String> {
                Ok(EnrichmentOutput {
                    atlas_matches: vec![aluskort_schemas::investigation::AtlasMatch {
                        technique_id: "AML.T0051".into(),
                        telemetry_trust_level: "untrusted".into(),
                        detection_id: "d1".into(),
                    }],
                    attestation: AttestationStatus::Untrusted,
                    ..Default::default()
                })
            }
        }

        let mut f = fixture(benign_verdict());
        f.orchestrator.enrichers = vec![Arc::new(UntrustedAtlas)];

        let state = f.orchestrator.run_investigation(&alert(Severity::Low)).await.unwrap();
        // High confidence, benign, no actions - but untrusted telemetry wins.
        assert_eq!(state.state, InvestigationState::AwaitingHuman);

        let events = audit_event_types(&f.bus).await;
        assert!(events.contains(&"telemetry.untrusted".to_string()));
    }

    #[tokio::test]
    async fn test_shadow_tenant_skips_execution() {
        let f = fixture(serde_json::json!({
            "classification": "false_positive",
            "confidence": 0.97,
            "recommended_actions": [
                {"playbook_id": "pb-notify", "description": "Notify", "tier": 1}
            ],
            "risk_state": "low"
        }));
        f.shadow.enable_shadow("t1");

        let state = f.orchestrator.run_investigation(&alert(Severity::Low)).await.unwrap();
        assert_eq!(state.state, InvestigationState::AwaitingHuman);
        assert_eq!(f.bus.len(topics::ACTIONS_PENDING), 0, "no execution in shadow");

        let events = audit_event_types(&f.bus).await;
        assert!(events.contains(&"decision.shadow_recorded".to_string()));
        assert!(events.contains(&"action.skipped_shadow".to_string()));

        // Analyst pairing produces an agreement sample
        assert!(f.agreement.record_analyst(state.investigation_id, "false_positive"));
        let rate = f
            .agreement
            .agreement_rate("t1", chrono::Duration::days(14))
            .unwrap();
        assert!((rate - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unparseable_verdict_goes_to_human() {
        let f = fixture(serde_json::json!("not an object"));
        let state = f.orchestrator.run_investigation(&alert(Severity::Medium)).await.unwrap();
        assert_eq!(state.state, InvestigationState::AwaitingHuman);
        assert_eq!(state.confidence, 0.0);
    }
}
