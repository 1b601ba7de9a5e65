//! FP evaluation: stratified sampling, cross-checking, and the autonomy
//! guard that raises thresholds when measured quality slips.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use aluskort_observability::ThresholdAdjuster;
use aluskort_schemas::Severity;

/// One auto-closure eligible for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureRecord {
    pub investigation_id: uuid::Uuid,
    pub tenant_id: String,
    pub rule_family: String,
    pub severity: Severity,
    pub asset_criticality: String,
    pub pattern_id: String,
    pub pattern_age_days: i64,
    pub closed_at: DateTime<Utc>,
    /// Set by the cross-check when another source later escalated this alert
    pub escalated_elsewhere: bool,
}

/// Stratum key: rule family x severity x asset criticality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stratum {
    pub rule_family: String,
    pub severity: Severity,
    pub asset_criticality: String,
}

const BASE_SAMPLE_PER_STRATUM: usize = 30;
const NOVEL_PATTERN_AGE_DAYS: i64 = 30;

/// Weekly review sampler: at least 30 closures per stratum, every closure
/// from a novel pattern.
pub struct StratifiedSampler {
    adjuster: Arc<ThresholdAdjuster>,
}

impl StratifiedSampler {
    pub fn new(adjuster: Arc<ThresholdAdjuster>) -> Self {
        Self { adjuster }
    }

    pub fn sample(&self, closures: &[ClosureRecord]) -> Vec<ClosureRecord> {
        let sample_size =
            (BASE_SAMPLE_PER_STRATUM as f64 * self.adjuster.sampling_multiplier()).ceil() as usize;

        let mut by_stratum: HashMap<Stratum, Vec<&ClosureRecord>> = HashMap::new();
        let mut selected: Vec<ClosureRecord> = Vec::new();

        for closure in closures {
            // Novel patterns get 100% review
            if closure.pattern_age_days < NOVEL_PATTERN_AGE_DAYS {
                selected.push(closure.clone());
                continue;
            }
            by_stratum
                .entry(Stratum {
                    rule_family: closure.rule_family.clone(),
                    severity: closure.severity,
                    asset_criticality: closure.asset_criticality.clone(),
                })
                .or_default()
                .push(closure);
        }

        let mut rng = rand::rng();
        for (_, mut members) in by_stratum {
            members.shuffle(&mut rng);
            selected.extend(members.into_iter().take(sample_size).cloned());
        }
        selected
    }
}

/// Daily cross-check: auto-closed alerts later escalated by another source
/// are flagged as potential false negatives.
pub struct CrossCheck;

impl CrossCheck {
    pub fn potential_false_negatives(closures: &[ClosureRecord]) -> Vec<&ClosureRecord> {
        closures.iter().filter(|c| c.escalated_elsewhere).collect()
    }
}

/// Measured quality over a review window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityMeasurement {
    pub precision: f64,
    pub false_negative_rate: f64,
}

const MIN_PRECISION: f64 = 0.98;
const MAX_FNR: f64 = 0.005;

/// Raises platform thresholds when quality slips below the floor.
pub struct AutonomyGuard {
    adjuster: Arc<ThresholdAdjuster>,
}

impl AutonomyGuard {
    pub fn new(adjuster: Arc<ThresholdAdjuster>) -> Self {
        Self { adjuster }
    }

    /// Apply one measurement. Returns true when the guard tightened.
    pub fn apply(&self, measurement: QualityMeasurement) -> bool {
        let breached = measurement.precision < MIN_PRECISION
            || measurement.false_negative_rate > MAX_FNR;
        if breached {
            self.adjuster
                .set_state(aluskort_observability::DriftState::Elevated);
            tracing::warn!(
                precision = measurement.precision,
                fnr = measurement.false_negative_rate,
                "autonomy guard tightened thresholds"
            );
        } else {
            self.adjuster
                .set_state(aluskort_observability::DriftState::Normal);
        }
        breached
    }
}
