//! The ordered gateway pipeline.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

use aluskort_persistence::{publish_audit, MessageBus};
use aluskort_schemas::{Actor, ActorType, AuditEventEnvelope, AuditEventType, AuditSeverity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::{adapter_for, ModelInvoker};
use crate::budget::{PromptBudgeter, SpendGuard, TierBudget};
use crate::error::GatewayError;
use crate::evidence::{build_evidence_block, EvidenceField};
use crate::injection::{GuardAction, InjectionClassifier};
use crate::pii::{PiiRedactor, RedactionMap};
use crate::taxonomy::TechniqueValidator;
use crate::transform::{summarize_untrusted, QUARANTINE_PLACEHOLDER};

/// A mediated model call.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub tenant_id: String,
    pub investigation_id: Uuid,
    /// Trusted task instructions (ours, not upstream's)
    pub system_instructions: String,
    /// Untrusted fields: (name, content)
    pub untrusted_fields: Vec<(String, String)>,
    /// Retrieval context, most relevant first
    pub retrieval_context: Vec<String>,
    pub tier: TierBudget,
    pub provider: String,
    pub model_id: String,
    pub json_output: bool,
}

/// Call accounting attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMetrics {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub prompt_hash: String,
    pub response_hash: String,
}

/// What the orchestrator gets back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Validated, deanonymised content - safe for automation
    pub content: String,
    /// Unmodified model output, for evidence only
    pub raw_output: String,
    pub quarantined_ids: Vec<String>,
    pub metrics: GatewayMetrics,
    pub taxonomy_version: String,
    /// Highest guard action applied to the inputs
    pub guard_action: GuardAction,
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The trust boundary for every LLM call.
pub struct ContextGateway {
    classifier: InjectionClassifier,
    validator: TechniqueValidator,
    spend_guard: SpendGuard,
    budgeter: PromptBudgeter,
    invoker: Arc<dyn ModelInvoker>,
    bus: Arc<dyn MessageBus>,
    redaction_key: [u8; 32],
}

impl ContextGateway {
    pub fn new(
        classifier: InjectionClassifier,
        validator: TechniqueValidator,
        spend_guard: SpendGuard,
        invoker: Arc<dyn ModelInvoker>,
        bus: Arc<dyn MessageBus>,
        redaction_key: [u8; 32],
    ) -> Self {
        Self {
            classifier,
            validator,
            spend_guard,
            budgeter: PromptBudgeter::default(),
            invoker,
            bus,
            redaction_key,
        }
    }

    /// Encrypt a redaction map for at-rest storage alongside the evidence.
    pub fn seal_redaction_map(&self, map: &RedactionMap) -> Result<String, GatewayError> {
        map.encrypt(&self.redaction_key)
    }

    /// Run the full pipeline for one call.
    pub async fn call(&self, request: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        // 1. Budget guard
        self.spend_guard.check(|spent| {
            tracing::warn!(tenant_id = %request.tenant_id, spent_usd = spent, "monthly soft spend threshold crossed");
        })?;

        // 2-3. Injection classification and transform, per untrusted field
        let mut worst_action = GuardAction::Pass;
        let mut fields = Vec::with_capacity(request.untrusted_fields.len());
        for (name, content) in &request.untrusted_fields {
            let scan = self.classifier.classify(content).await;
            let transformed = match scan.action {
                GuardAction::Pass => content.clone(),
                GuardAction::Summarize => summarize_untrusted(content),
                GuardAction::Quarantine => QUARANTINE_PLACEHOLDER.to_string(),
            };
            match scan.action {
                GuardAction::Quarantine => {
                    worst_action = GuardAction::Quarantine;
                    self.emit_security_event(
                        &request,
                        AuditEventType::InjectionQuarantined,
                        serde_json::json!({
                            "field": name,
                            "pattern_hits": scan.pattern_hits,
                        }),
                    )
                    .await;
                }
                GuardAction::Summarize => {
                    if worst_action == GuardAction::Pass {
                        worst_action = GuardAction::Summarize;
                    }
                    self.emit_security_event(
                        &request,
                        AuditEventType::InjectionDetected,
                        serde_json::json!({
                            "field": name,
                            "pattern_hits": scan.pattern_hits,
                        }),
                    )
                    .await;
                }
                GuardAction::Pass => {}
            }
            fields.push(EvidenceField {
                name: name.clone(),
                content: transformed,
            });
        }

        // 4. PII redaction over transformed fields and retrieval context
        let mut map = RedactionMap::new();
        for field in &mut fields {
            field.content = PiiRedactor::redact(&field.content, &mut map);
        }
        let retrieval: Vec<String> = request
            .retrieval_context
            .iter()
            .map(|c| PiiRedactor::redact(c, &mut map))
            .collect();
        if !map.is_empty() {
            self.emit_security_event(
                &request,
                AuditEventType::PiiRedacted,
                serde_json::json!({"placeholders": map.len()}),
            )
            .await;
        }

        // 6. Tier-scaled budgeting of retrieval context
        let kept_retrieval = self.budgeter.fit_retrieval(
            request.tier,
            &[&request.system_instructions],
            retrieval,
        );
        for (i, chunk) in kept_retrieval.into_iter().enumerate() {
            fields.push(EvidenceField {
                name: format!("retrieval_{i}"),
                content: chunk,
            });
        }

        // 5. Evidence isolation
        let evidence_block = build_evidence_block(&fields);

        // 7. Provider adaptation and the model call
        let adapter = adapter_for(&request.provider)
            .ok_or_else(|| GatewayError::Assembly(format!("no adapter for provider {}", request.provider)))?;
        let provider_request = adapter.assemble(
            &request.model_id,
            &request.system_instructions,
            &evidence_block,
            request.tier.max_tokens(),
            request.json_output,
        );
        let prompt_hash = sha256_hex(&provider_request.body.to_string());

        let started = Instant::now();
        let output = self
            .invoker
            .invoke(provider_request)
            .await
            .map_err(GatewayError::ModelCall)?;
        let latency_ms = started.elapsed().as_millis() as u64;
        self.spend_guard.record(output.cost_usd);

        // 8. Deanonymise placeholders in the response
        let deanonymised = PiiRedactor::deanonymise(&output.content, &map);

        // 9. Output validation against the taxonomy
        let validated = self.validator.validate(&deanonymised).await;
        for id in &validated.quarantined_ids {
            self.emit_security_event(
                &request,
                AuditEventType::TechniqueQuarantined,
                serde_json::json!({
                    "technique_id": id,
                    "taxonomy_version": validated.taxonomy_version,
                }),
            )
            .await;
        }

        Ok(GatewayResponse {
            content: validated.content,
            raw_output: output.content.clone(),
            quarantined_ids: validated.quarantined_ids,
            metrics: GatewayMetrics {
                tokens_in: output.tokens_in,
                tokens_out: output.tokens_out,
                cost_usd: output.cost_usd,
                latency_ms,
                prompt_hash,
                response_hash: sha256_hex(&output.content),
            },
            taxonomy_version: validated.taxonomy_version,
            guard_action: worst_action,
        })
    }

    /// Security events are best-effort: a bus blip must not fail the call.
    async fn emit_security_event(
        &self,
        request: &GatewayRequest,
        event_type: AuditEventType,
        decision: serde_json::Value,
    ) {
        let envelope = AuditEventEnvelope::new(
            request.tenant_id.clone(),
            "gateway",
            event_type,
            AuditSeverity::Warning,
            Actor {
                actor_type: ActorType::System,
                id: "context-gateway".into(),
                permissions: vec![],
            },
        )
        .with_investigation(request.investigation_id)
        .with_decision(decision);

        if let Err(e) = publish_audit(self.bus.as_ref(), &envelope).await {
            tracing::error!(error = %e, event = %envelope.event_type.as_str(), "audit emission failed");
        }
    }
}
