//! Drift detection over alert distributions.
//!
//! Jensen-Shannon divergence between a rolling window and a baseline, for
//! three distributions: alert source mix, technique frequency, and entity
//! patterns. The weighted overall score (0.4/0.35/0.25) flips the shared
//! adjuster to elevated above the configured threshold.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::threshold::{DriftState, ThresholdAdjuster};

/// A categorical distribution as observed counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Distribution {
    counts: HashMap<String, u64>,
    total: u64,
}

impl Distribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, category: impl Into<String>) {
        *self.counts.entry(category.into()).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn observe_n(&mut self, category: impl Into<String>, n: u64) {
        *self.counts.entry(category.into()).or_insert(0) += n;
        self.total += n;
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    fn probability(&self, category: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        *self.counts.get(category).unwrap_or(&0) as f64 / self.total as f64
    }

    fn categories<'a>(&'a self, other: &'a Distribution) -> impl Iterator<Item = &'a String> {
        self.counts
            .keys()
            .chain(other.counts.keys().filter(|k| !self.counts.contains_key(*k)))
    }
}

fn kl_term(p: f64, q: f64) -> f64 {
    if p == 0.0 || q == 0.0 {
        0.0
    } else {
        p * (p / q).log2()
    }
}

/// Jensen-Shannon divergence in bits, bounded [0, 1].
pub fn jensen_shannon(p: &Distribution, q: &Distribution) -> f64 {
    if p.is_empty() || q.is_empty() {
        return 0.0;
    }
    let mut js = 0.0;
    for category in p.categories(q) {
        let pi = p.probability(category);
        let qi = q.probability(category);
        let mi = 0.5 * (pi + qi);
        js += 0.5 * kl_term(pi, mi) + 0.5 * kl_term(qi, mi);
    }
    js
}

/// Detector configuration. The 0.3 threshold is the reference default;
/// operational tuning per tenant is a deployment concern.
#[derive(Debug, Clone)]
pub struct DriftDetectorConfig {
    pub threshold: f64,
    pub source_weight: f64,
    pub technique_weight: f64,
    pub entity_weight: f64,
}

impl Default for DriftDetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            source_weight: 0.4,
            technique_weight: 0.35,
            entity_weight: 0.25,
        }
    }
}

/// Per-dimension and overall drift scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub source_divergence: f64,
    pub technique_divergence: f64,
    pub entity_divergence: f64,
    pub overall: f64,
    pub elevated: bool,
}

/// Rolling-window drift detector feeding the shared adjuster.
pub struct DriftDetector {
    config: DriftDetectorConfig,
    adjuster: Arc<ThresholdAdjuster>,

    baseline_sources: Distribution,
    baseline_techniques: Distribution,
    baseline_entities: Distribution,

    window_sources: Distribution,
    window_techniques: Distribution,
    window_entities: Distribution,
}

impl DriftDetector {
    pub fn new(config: DriftDetectorConfig, adjuster: Arc<ThresholdAdjuster>) -> Self {
        Self {
            config,
            adjuster,
            baseline_sources: Distribution::new(),
            baseline_techniques: Distribution::new(),
            baseline_entities: Distribution::new(),
            window_sources: Distribution::new(),
            window_techniques: Distribution::new(),
            window_entities: Distribution::new(),
        }
    }

    /// Seed the baseline from historical observations.
    pub fn seed_baseline(
        &mut self,
        sources: Distribution,
        techniques: Distribution,
        entities: Distribution,
    ) {
        self.baseline_sources = sources;
        self.baseline_techniques = techniques;
        self.baseline_entities = entities;
    }

    /// Observe one alert in the rolling window.
    pub fn observe(&mut self, source: &str, techniques: &[String], entity_pattern: &str) {
        self.window_sources.observe(source);
        for t in techniques {
            self.window_techniques.observe(t.clone());
        }
        self.window_entities.observe(entity_pattern);
    }

    /// Score the window against the baseline and update the adjuster.
    pub fn evaluate(&self) -> DriftReport {
        let source_divergence = jensen_shannon(&self.window_sources, &self.baseline_sources);
        let technique_divergence =
            jensen_shannon(&self.window_techniques, &self.baseline_techniques);
        let entity_divergence = jensen_shannon(&self.window_entities, &self.baseline_entities);

        let overall = self.config.source_weight * source_divergence
            + self.config.technique_weight * technique_divergence
            + self.config.entity_weight * entity_divergence;

        let elevated = overall > self.config.threshold;
        self.adjuster.set_state(if elevated {
            DriftState::Elevated
        } else {
            DriftState::Normal
        });

        if elevated {
            tracing::warn!(
                overall = overall,
                sources = source_divergence,
                techniques = technique_divergence,
                entities = entity_divergence,
                "drift elevated"
            );
        }

        DriftReport {
            source_divergence,
            technique_divergence,
            entity_divergence,
            overall,
            elevated,
        }
    }

    /// Roll the window into the baseline and start a fresh window.
    pub fn rotate_window(&mut self) {
        self.baseline_sources = std::mem::take(&mut self.window_sources);
        self.baseline_techniques = std::mem::take(&mut self.window_techniques);
        self.baseline_entities = std::mem::take(&mut self.window_entities);
    }
}
