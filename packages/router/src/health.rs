//! Provider health registry and degradation levels.
//!
//! The registry owns one breaker per provider and computes the platform-wide
//! degradation level. The resulting policy is advisory: the router attaches
//! it to every decision, the orchestrator enforces it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::registry::Tier;

/// Platform-wide capability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DegradationLevel {
    /// All providers healthy
    FullCapability,
    /// Primary down, a secondary carries the load
    SecondaryActive,
    /// No LLM provider reachable; deterministic pipeline only
    DeterministicOnly,
    /// Infrastructure-wide outage
    Passthrough,
}

/// Advisory policy derived from the degradation level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradationPolicy {
    pub confidence_threshold_override: Option<f64>,
    pub auto_close_allowed: bool,
    pub extended_thinking_available: bool,
    pub max_tier: Option<Tier>,
}

impl DegradationPolicy {
    pub fn for_level(level: DegradationLevel) -> Self {
        match level {
            DegradationLevel::FullCapability => Self {
                confidence_threshold_override: None,
                auto_close_allowed: true,
                extended_thinking_available: true,
                max_tier: Some(Tier::Tier2),
            },
            DegradationLevel::SecondaryActive => Self {
                confidence_threshold_override: Some(0.95),
                auto_close_allowed: true,
                extended_thinking_available: false,
                max_tier: Some(Tier::Tier1),
            },
            DegradationLevel::DeterministicOnly => Self {
                confidence_threshold_override: None,
                auto_close_allowed: false,
                extended_thinking_available: false,
                max_tier: None,
            },
            DegradationLevel::Passthrough => Self {
                confidence_threshold_override: None,
                auto_close_allowed: false,
                extended_thinking_available: false,
                max_tier: None,
            },
        }
    }
}

/// One breaker per provider plus the infrastructure outage flag.
pub struct ProviderHealthRegistry {
    primary_provider: String,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    infrastructure_outage: RwLock<bool>,
}

impl ProviderHealthRegistry {
    pub fn new(primary_provider: impl Into<String>, providers: &[&str]) -> Self {
        let breakers = providers
            .iter()
            .map(|p| (p.to_string(), Arc::new(CircuitBreaker::default())))
            .collect();
        Self {
            primary_provider: primary_provider.into(),
            breakers: RwLock::new(breakers),
            infrastructure_outage: RwLock::new(false),
        }
    }

    pub fn breaker(&self, provider: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.write();
        breakers
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::default()))
            .clone()
    }

    pub fn is_available(&self, provider: &str) -> bool {
        self.breaker(provider).is_available()
    }

    pub fn record_success(&self, provider: &str) {
        self.breaker(provider).record_success();
    }

    /// Record a provider failure. Only transient failures (5xx, timeouts)
    /// belong here; 400-class contract errors bypass the breaker entirely.
    pub fn record_failure(&self, provider: &str) {
        self.breaker(provider).record_failure();
    }

    pub fn set_infrastructure_outage(&self, outage: bool) {
        *self.infrastructure_outage.write() = outage;
    }

    /// Compute the current degradation level from breaker states.
    pub fn degradation_level(&self) -> DegradationLevel {
        if *self.infrastructure_outage.read() {
            return DegradationLevel::Passthrough;
        }
        let breakers = self.breakers.read();
        let primary_up = breakers
            .get(&self.primary_provider)
            .is_none_or(|b| b.current_state() != crate::breaker::BreakerState::Open);
        let any_secondary_up = breakers
            .iter()
            .filter(|(p, _)| **p != self.primary_provider)
            .any(|(_, b)| b.current_state() != crate::breaker::BreakerState::Open);

        if primary_up {
            DegradationLevel::FullCapability
        } else if any_secondary_up {
            DegradationLevel::SecondaryActive
        } else {
            DegradationLevel::DeterministicOnly
        }
    }

    pub fn policy(&self) -> DegradationPolicy {
        DegradationPolicy::for_level(self.degradation_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderHealthRegistry {
        ProviderHealthRegistry::new("anthropic", &["anthropic", "openai"])
    }

    fn trip(registry: &ProviderHealthRegistry, provider: &str) {
        for _ in 0..5 {
            registry.record_failure(provider);
        }
    }

    #[test]
    fn test_full_capability_when_healthy() {
        let r = registry();
        assert_eq!(r.degradation_level(), DegradationLevel::FullCapability);
        let policy = r.policy();
        assert!(policy.auto_close_allowed);
        assert!(policy.extended_thinking_available);
        assert_eq!(policy.max_tier, Some(Tier::Tier2));
    }

    #[test]
    fn test_secondary_active_when_primary_down() {
        let r = registry();
        trip(&r, "anthropic");
        assert_eq!(r.degradation_level(), DegradationLevel::SecondaryActive);
        let policy = r.policy();
        assert_eq!(policy.confidence_threshold_override, Some(0.95));
        assert!(!policy.extended_thinking_available);
        assert!(policy.auto_close_allowed);
    }

    #[test]
    fn test_deterministic_only_when_all_down() {
        let r = registry();
        trip(&r, "anthropic");
        trip(&r, "openai");
        assert_eq!(r.degradation_level(), DegradationLevel::DeterministicOnly);
        assert!(!r.policy().auto_close_allowed);
    }

    #[test]
    fn test_passthrough_overrides_everything() {
        let r = registry();
        r.set_infrastructure_outage(true);
        assert_eq!(r.degradation_level(), DegradationLevel::Passthrough);
    }

    #[test]
    fn test_recovery_restores_full_capability() {
        let r = registry();
        trip(&r, "anthropic");
        r.record_success("anthropic");
        assert_eq!(r.degradation_level(), DegradationLevel::FullCapability);
    }
}
