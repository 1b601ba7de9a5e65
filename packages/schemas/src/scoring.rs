//! Incident recency scoring and IOC cache TTL tiers.

use std::time::Duration;

/// Floor applied to incidents flagged rare-but-important so they never age
/// out of retrieval entirely.
const RARE_IMPORTANT_FLOOR: f64 = 0.1;

/// Composite recency score for a prior incident.
///
/// Two decay curves blended 0.7/0.3: a short-term exponential with a ~30-day
/// half-life and a slow logarithmic tail that keeps year-old incidents
/// retrievable at a reduced weight.
pub fn recency_score(age_days: f64, rare_important: bool) -> f64 {
    let short_term = (-0.023 * age_days).exp();
    let long_term = 1.0 / (1.0 + (1.0 + age_days / 365.0).ln());
    let combined = 0.7 * short_term + 0.3 * long_term;
    if rare_important {
        combined.max(RARE_IMPORTANT_FLOOR)
    } else {
        combined
    }
}

/// IOC cache TTL by provider confidence (0-100).
pub fn ioc_ttl(confidence: u8) -> Duration {
    if confidence > 80 {
        Duration::from_secs(30 * 24 * 3600)
    } else if confidence >= 50 {
        Duration::from_secs(7 * 24 * 3600)
    } else {
        Duration::from_secs(24 * 3600)
    }
}
