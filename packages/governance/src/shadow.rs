//! Tenant-level shadow mode and go-live gating.
//!
//! New tenants run the full pipeline with execution disabled. Leaving shadow
//! requires an explicit sign-off AND measured performance: two weeks of
//! agreement at 95%, FP precision at 0.98, zero missed critical true
//! positives, and cost inside projection.

use chrono::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use aluskort_observability::AgreementTracker;
use aluskort_persistence::{publish_audit, MessageBus};
use aluskort_schemas::{Actor, ActorType, AuditEventEnvelope, AuditEventType, AuditSeverity};

use crate::error::GovernanceError;

/// Measured inputs to the go-live decision that live outside the agreement
/// tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoLiveCriteria {
    pub fp_precision: f64,
    pub missed_critical_tps: u64,
    pub cost_usd: f64,
    pub projected_cost_usd: f64,
    pub go_live_signed_off: bool,
}

const MIN_AGREEMENT: f64 = 0.95;
const MIN_PRECISION: f64 = 0.98;
const AGREEMENT_LOOKBACK_DAYS: i64 = 14;

struct TenantShadowState {
    shadow: bool,
}

/// Shadow mode registry. Tenants default to shadow ON.
pub struct ShadowModeManager {
    default_shadow: bool,
    tenants: RwLock<HashMap<String, TenantShadowState>>,
    agreement: Arc<AgreementTracker>,
    bus: Arc<dyn MessageBus>,
}

impl ShadowModeManager {
    pub fn new(default_shadow: bool, agreement: Arc<AgreementTracker>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            default_shadow,
            tenants: RwLock::new(HashMap::new()),
            agreement,
            bus,
        }
    }

    /// Is this tenant currently in shadow? Unknown tenants get the default.
    pub fn is_shadow(&self, tenant_id: &str) -> bool {
        self.tenants
            .read()
            .get(tenant_id)
            .map(|s| s.shadow)
            .unwrap_or(self.default_shadow)
    }

    /// Force a tenant back into shadow (always allowed).
    pub fn enable_shadow(&self, tenant_id: &str) {
        self.tenants
            .write()
            .insert(tenant_id.to_string(), TenantShadowState { shadow: true });
        tracing::info!(tenant_id = %tenant_id, "shadow mode enabled");
    }

    /// Attempt to take a tenant live. Refused unless signed off and every
    /// measured criterion clears its bar.
    pub async fn go_live(
        &self,
        tenant_id: &str,
        criteria: &GoLiveCriteria,
        approved_by: &str,
    ) -> Result<(), GovernanceError> {
        let refuse = |reason: &str| GovernanceError::GoLiveRefused {
            tenant_id: tenant_id.to_string(),
            reason: reason.to_string(),
        };

        if !criteria.go_live_signed_off {
            return Err(refuse("go-live has not been signed off"));
        }
        let agreement = self
            .agreement
            .agreement_rate(tenant_id, Duration::days(AGREEMENT_LOOKBACK_DAYS))
            .ok_or_else(|| refuse("no resolved shadow decisions in the lookback window"))?;
        if agreement < MIN_AGREEMENT {
            return Err(refuse(&format!(
                "agreement {agreement:.3} below required {MIN_AGREEMENT}"
            )));
        }
        if criteria.fp_precision < MIN_PRECISION {
            return Err(refuse(&format!(
                "fp precision {:.3} below required {MIN_PRECISION}",
                criteria.fp_precision
            )));
        }
        if criteria.missed_critical_tps > 0 {
            return Err(refuse("missed critical true positives in shadow window"));
        }
        if criteria.cost_usd > criteria.projected_cost_usd {
            return Err(refuse("cost exceeded projection"));
        }

        self.tenants
            .write()
            .insert(tenant_id.to_string(), TenantShadowState { shadow: false });

        let envelope = AuditEventEnvelope::new(
            tenant_id,
            "governance",
            AuditEventType::ShadowGoLive,
            AuditSeverity::Warning,
            Actor {
                actor_type: ActorType::Human,
                id: approved_by.to_string(),
                permissions: vec!["go_live".into()],
            },
        )
        .with_decision(serde_json::json!({
            "agreement": agreement,
            "fp_precision": criteria.fp_precision,
            "cost_usd": criteria.cost_usd,
        }));
        if let Err(e) = publish_audit(self.bus.as_ref(), &envelope).await {
            tracing::error!(error = %e, "go-live audit emission failed");
        }
        tracing::warn!(tenant_id = %tenant_id, approved_by = %approved_by, "tenant left shadow mode");
        Ok(())
    }
}
