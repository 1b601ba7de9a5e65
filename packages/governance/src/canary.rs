//! Canary measurement at two levels.
//!
//! Per-pattern: shadow patterns tally their would-be closes against analyst
//! outcomes and promote to active only with enough volume and near-zero
//! disagreement.
//!
//! System-level: slices of traffic (tenant, severity band, rule family, data
//! source) gain autonomy gradually. A slice that misses a true positive or
//! drops below the precision floor is rolled back to shadow and a kill
//! switch is armed for it.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use aluskort_persistence::{publish_audit, MessageBus};
use aluskort_schemas::{
    Actor, ActorType, AuditEventEnvelope, AuditEventType, AuditSeverity, FpPattern, PatternStatus,
};

use crate::killswitch::{KillSwitchDimension, KillSwitchManager};

/// Per-pattern canary thresholds.
const MIN_DECISIONS: u64 = 50;
const MAX_DISAGREEMENT: f64 = 0.05;

/// Tallies shadow-pattern decisions and decides promotion.
pub struct PatternCanary;

impl PatternCanary {
    /// Record one candidate close against the analyst outcome.
    pub fn record(pattern: &mut FpPattern, analyst_agreed: bool) {
        if analyst_agreed {
            pattern.agree_count += 1;
        } else {
            pattern.disagree_count += 1;
        }
    }

    /// Promote when volume and agreement both clear the bar. Returns true
    /// when the pattern transitioned to `Active`.
    pub fn try_promote(pattern: &mut FpPattern) -> bool {
        if pattern.status != PatternStatus::Shadow {
            return false;
        }
        let total = pattern.agree_count + pattern.disagree_count;
        if total >= MIN_DECISIONS && pattern.disagreement_rate() <= MAX_DISAGREEMENT {
            pattern.status = PatternStatus::Active;
            tracing::info!(
                pattern_id = %pattern.pattern_id,
                decisions = total,
                disagreement = pattern.disagreement_rate(),
                "shadow pattern promoted to active"
            );
            true
        } else {
            false
        }
    }
}

/// Slice dimension for system-level rollout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceKey {
    Tenant(String),
    SeverityBand(String),
    RuleFamily(String),
    DataSource(String),
}

impl SliceKey {
    fn kill_switch_dimension(&self) -> (KillSwitchDimension, &str) {
        match self {
            SliceKey::Tenant(v) => (KillSwitchDimension::Tenant, v),
            SliceKey::RuleFamily(v) => (KillSwitchDimension::Pattern, v),
            SliceKey::DataSource(v) => (KillSwitchDimension::DataSource, v),
            SliceKey::SeverityBand(v) => (KillSwitchDimension::Pattern, v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceStatus {
    Shadow,
    /// Live canary: automation on, under promotion criteria
    Active,
    /// Graduated: automation on, standard monitoring
    Promoted,
}

/// One canary slice's running tallies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanarySlice {
    pub key: SliceKey,
    pub status: SliceStatus,
    pub started_at: DateTime<Utc>,
    pub true_closures: u64,
    pub false_closures: u64,
    pub missed_true_positives: u64,
}

impl CanarySlice {
    pub fn precision(&self) -> Option<f64> {
        let total = self.true_closures + self.false_closures;
        if total == 0 {
            return None;
        }
        Some(self.true_closures as f64 / total as f64)
    }
}

/// Promotion: 7 days active, precision >= 0.98, zero missed TPs.
/// Rollback: precision < 0.95 OR any missed TP.
pub struct CanaryRollout {
    slices: RwLock<HashMap<SliceKey, CanarySlice>>,
    kill_switches: Arc<KillSwitchManager>,
    bus: Arc<dyn MessageBus>,
}

impl CanaryRollout {
    pub fn new(kill_switches: Arc<KillSwitchManager>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            slices: RwLock::new(HashMap::new()),
            kill_switches,
            bus,
        }
    }

    /// Enter a slice into active canary.
    pub fn start(&self, key: SliceKey) {
        self.slices.write().insert(
            key.clone(),
            CanarySlice {
                key,
                status: SliceStatus::Active,
                started_at: Utc::now(),
                true_closures: 0,
                false_closures: 0,
                missed_true_positives: 0,
            },
        );
    }

    pub fn get(&self, key: &SliceKey) -> Option<CanarySlice> {
        self.slices.read().get(key).cloned()
    }

    /// Record an auto-closure outcome for the slice.
    pub fn record_closure(&self, key: &SliceKey, was_true_fp: bool) {
        if let Some(slice) = self.slices.write().get_mut(key) {
            if was_true_fp {
                slice.true_closures += 1;
            } else {
                slice.false_closures += 1;
            }
        }
    }

    /// Record a true positive the slice auto-closed (detected later).
    pub fn record_missed_tp(&self, key: &SliceKey) {
        if let Some(slice) = self.slices.write().get_mut(key) {
            slice.missed_true_positives += 1;
        }
    }

    /// Evaluate one slice: promote, roll back, or hold. Rollback arms the
    /// slice's kill switch.
    pub async fn evaluate(&self, key: &SliceKey) -> Option<SliceStatus> {
        let decision = {
            let slices = self.slices.read();
            let slice = slices.get(key)?;
            if slice.status != SliceStatus::Active {
                return Some(slice.status);
            }
            let precision = slice.precision();
            let age = Utc::now() - slice.started_at;

            if slice.missed_true_positives > 0 || precision.is_some_and(|p| p < 0.95) {
                Some(SliceStatus::Shadow)
            } else if age >= Duration::days(7) && precision.is_some_and(|p| p >= 0.98) {
                Some(SliceStatus::Promoted)
            } else {
                None
            }
        };

        match decision {
            Some(SliceStatus::Shadow) => {
                {
                    let mut slices = self.slices.write();
                    if let Some(slice) = slices.get_mut(key) {
                        slice.status = SliceStatus::Shadow;
                    }
                }
                let (dimension, value) = key.kill_switch_dimension();
                self.kill_switches
                    .activate(dimension, value, "canary-rollout", "slice rolled back")
                    .await;
                self.emit(AuditEventType::CanaryRolledBack, key).await;
                Some(SliceStatus::Shadow)
            }
            Some(SliceStatus::Promoted) => {
                {
                    let mut slices = self.slices.write();
                    if let Some(slice) = slices.get_mut(key) {
                        slice.status = SliceStatus::Promoted;
                    }
                }
                self.emit(AuditEventType::CanaryPromoted, key).await;
                Some(SliceStatus::Promoted)
            }
            _ => self.get(key).map(|s| s.status),
        }
    }

    async fn emit(&self, event_type: AuditEventType, key: &SliceKey) {
        let envelope = AuditEventEnvelope::new(
            "platform",
            "governance",
            event_type,
            AuditSeverity::Warning,
            Actor {
                actor_type: ActorType::System,
                id: "canary-rollout".into(),
                permissions: vec![],
            },
        )
        .with_decision(serde_json::to_value(key).unwrap_or_default());
        if let Err(e) = publish_audit(self.bus.as_ref(), &envelope).await {
            tracing::error!(error = %e, "canary audit emission failed");
        }
    }
}
