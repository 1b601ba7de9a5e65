//! FP pattern matching.
//!
//! Composite confidence is the mean of a name-match score and an
//! entity-match score. Only active, scope-matching patterns participate;
//! an empty scope matches any investigation. The effective threshold starts
//! at the pattern's own bar but is floored by the drift-adjusted platform
//! threshold and by the degradation policy.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use regex::Regex;
use serde::{Deserialize, Serialize};

use aluskort_observability::ThresholdAdjuster;
use aluskort_router::DegradationPolicy;
use aluskort_schemas::{EntityMatcher, FpPattern, GraphState, PatternStatus};

/// A successful match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpMatch {
    pub pattern_id: String,
    pub confidence: f64,
    pub effective_threshold: f64,
}

/// Scope check: every set field must match; unset fields match anything.
fn scope_matches(
    pattern: &FpPattern,
    state: &GraphState,
    rule_family: Option<&str>,
    asset_class: Option<&str>,
) -> bool {
    if let Some(tenant) = &pattern.scope.tenant_id {
        if tenant != &state.tenant_id {
            return false;
        }
    }
    if let Some(required) = &pattern.scope.rule_family {
        if rule_family != Some(required.as_str()) {
            return false;
        }
    }
    if let Some(required) = &pattern.scope.asset_class {
        if asset_class != Some(required.as_str()) {
            return false;
        }
    }
    true
}

fn name_score(pattern: &FpPattern, title: &str) -> f64 {
    let title_lower = title.to_lowercase();
    pattern
        .alert_names
        .iter()
        .map(|name| {
            let name_lower = name.to_lowercase();
            if name_lower == title_lower {
                1.0
            } else if title_lower.contains(&name_lower) || name_lower.contains(&title_lower) {
                0.8
            } else {
                token_overlap(&name_lower, &title_lower)
            }
        })
        .fold(0.0, f64::max)
}

fn token_overlap(a: &str, b: &str) -> f64 {
    let ta: HashSet<&str> = a.split_whitespace().collect();
    let tb: HashSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

fn entity_matches(matcher: &EntityMatcher, value: &str) -> bool {
    match matcher {
        EntityMatcher::Regex(pattern) => Regex::new(pattern)
            .map(|re| re.is_match(value))
            .unwrap_or(false),
        EntityMatcher::Cidr(cidr) => {
            let Ok(network) = cidr.parse::<IpNetwork>() else {
                return false;
            };
            value
                .parse::<IpAddr>()
                .map(|ip| network.contains(ip))
                .unwrap_or(false)
        }
    }
}

fn entity_score(pattern: &FpPattern, state: &GraphState) -> f64 {
    if pattern.entity_matchers.is_empty() {
        // No entity conditions: neutral full score, the name carries it.
        return 1.0;
    }
    let values: Vec<&String> = state.entities.values().flatten().collect();
    if values.is_empty() {
        return 0.0;
    }
    let matched = pattern
        .entity_matchers
        .iter()
        .filter(|m| values.iter().any(|v| entity_matches(m, v)))
        .count();
    matched as f64 / pattern.entity_matchers.len() as f64
}

/// Matcher over the governed pattern set.
pub struct FpMatcher {
    adjuster: Arc<ThresholdAdjuster>,
}

impl FpMatcher {
    pub fn new(adjuster: Arc<ThresholdAdjuster>) -> Self {
        Self { adjuster }
    }

    /// Effective threshold for a pattern under current drift and degradation.
    pub fn effective_threshold(
        &self,
        pattern: &FpPattern,
        degradation: Option<&DegradationPolicy>,
    ) -> f64 {
        let mut threshold = pattern.confidence_threshold.max(self.adjuster.fp_threshold());
        if let Some(policy) = degradation {
            if let Some(override_threshold) = policy.confidence_threshold_override {
                threshold = threshold.max(override_threshold);
            }
        }
        threshold
    }

    /// Find the best match at or above the effective threshold.
    ///
    /// Only `Active` patterns participate; shadow patterns are tallied by the
    /// canary instead of short-circuiting.
    pub fn best_match(
        &self,
        state: &GraphState,
        title: &str,
        rule_family: Option<&str>,
        asset_class: Option<&str>,
        patterns: &[FpPattern],
        degradation: Option<&DegradationPolicy>,
    ) -> Option<FpMatch> {
        patterns
            .iter()
            .filter(|p| p.status == PatternStatus::Active)
            .filter(|p| scope_matches(p, state, rule_family, asset_class))
            .filter_map(|p| {
                let composite = (name_score(p, title) + entity_score(p, state)) / 2.0;
                let threshold = self.effective_threshold(p, degradation);
                (composite >= threshold).then(|| FpMatch {
                    pattern_id: p.pattern_id.clone(),
                    confidence: composite,
                    effective_threshold: threshold,
                })
            })
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    /// Composite score regardless of threshold, for shadow-pattern tallying.
    pub fn composite_score(&self, state: &GraphState, title: &str, pattern: &FpPattern) -> f64 {
        (name_score(pattern, title) + entity_score(pattern, state)) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aluskort_schemas::{PatternScope, Severity};

    fn active_pattern(id: &str) -> FpPattern {
        FpPattern::new(id)
            .with_alert_names(vec!["Scheduled scan completed".into()])
            .with_status(PatternStatus::Active)
    }

    fn state_with_entity(ip: &str) -> GraphState {
        let mut state = GraphState::new("a1", "t1", Severity::Low);
        state.entities.insert("ip".into(), vec![ip.into()]);
        state
    }

    fn matcher() -> FpMatcher {
        FpMatcher::new(Arc::new(ThresholdAdjuster::new()))
    }

    #[test]
    fn test_exact_name_with_cidr_entity() {
        let mut pattern = active_pattern("fp-001");
        pattern.entity_matchers = vec![EntityMatcher::Cidr("10.0.0.0/8".into())];
        let state = state_with_entity("10.1.2.3");

        let m = matcher()
            .best_match(&state, "Scheduled scan completed", None, None, &[pattern], None)
            .unwrap();
        assert_eq!(m.pattern_id, "fp-001");
        assert!((m.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_entity_outside_cidr_fails_threshold() {
        let mut pattern = active_pattern("fp-001");
        pattern.entity_matchers = vec![EntityMatcher::Cidr("10.0.0.0/8".into())];
        let state = state_with_entity("192.168.1.1");
        // name 1.0, entity 0.0 -> composite 0.5 < 0.90
        assert!(matcher()
            .best_match(&state, "Scheduled scan completed", None, None, &[pattern], None)
            .is_none());
    }

    #[test]
    fn test_regex_entity_matcher() {
        let mut pattern = active_pattern("fp-002");
        pattern.entity_matchers = vec![EntityMatcher::Regex(r"^svc-backup-\d+$".into())];
        let mut state = GraphState::new("a1", "t1", Severity::Low);
        state.entities.insert("account".into(), vec!["svc-backup-07".into()]);

        let m = matcher()
            .best_match(&state, "Scheduled scan completed", None, None, &[pattern], None)
            .unwrap();
        assert!((m.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_shadow_patterns_never_short_circuit() {
        let pattern = active_pattern("fp-003").with_status(PatternStatus::Shadow);
        let state = state_with_entity("10.0.0.1");
        assert!(matcher()
            .best_match(&state, "Scheduled scan completed", None, None, &[pattern], None)
            .is_none());
    }

    #[test]
    fn test_tenant_scope_respected() {
        let pattern = active_pattern("fp-004").with_scope(PatternScope {
            tenant_id: Some("t2".into()),
            ..Default::default()
        });
        let state = state_with_entity("10.0.0.1");
        assert!(matcher()
            .best_match(&state, "Scheduled scan completed", None, None, &[pattern], None)
            .is_none());
    }

    #[test]
    fn test_empty_scope_matches_any_tenant() {
        let pattern = active_pattern("fp-005");
        assert!(pattern.scope.is_empty());
        let state = state_with_entity("10.0.0.1");
        assert!(matcher()
            .best_match(&state, "Scheduled scan completed", None, None, &[pattern], None)
            .is_some());
    }

    #[test]
    fn test_drift_elevation_raises_bar() {
        let adjuster = Arc::new(ThresholdAdjuster::new());
        let fp_matcher = FpMatcher::new(adjuster.clone());

        let mut pattern = active_pattern("fp-006");
        // Partial name match only: composite lands between 0.90 and 0.95
        pattern.alert_names = vec!["Scheduled scan completed on host".into()];
        pattern.entity_matchers = vec![EntityMatcher::Cidr("10.0.0.0/8".into())];
        let state = state_with_entity("10.0.0.1");

        let composite =
            fp_matcher.composite_score(&state, "Scheduled scan completed", &pattern);
        assert!((0.90..0.95).contains(&composite), "composite={composite}");

        assert!(fp_matcher
            .best_match(&state, "Scheduled scan completed", None, None, std::slice::from_ref(&pattern), None)
            .is_some());

        adjuster.set_state(aluskort_observability::DriftState::Elevated);
        assert!(
            fp_matcher
                .best_match(&state, "Scheduled scan completed", None, None, &[pattern], None)
                .is_none(),
            "elevated drift raises the bar to 0.95"
        );
    }

    #[test]
    fn test_degradation_policy_raises_bar() {
        let fp_matcher = matcher();
        let mut pattern = active_pattern("fp-007");
        pattern.alert_names = vec!["Scheduled scan completed on host".into()];
        pattern.entity_matchers = vec![EntityMatcher::Cidr("10.0.0.0/8".into())];
        let state = state_with_entity("10.0.0.1");

        let policy = DegradationPolicy {
            confidence_threshold_override: Some(0.95),
            auto_close_allowed: true,
            extended_thinking_available: false,
            max_tier: None,
        };
        assert!(fp_matcher
            .best_match(&state, "Scheduled scan completed", None, None, &[pattern], Some(&policy))
            .is_none());
    }
}
