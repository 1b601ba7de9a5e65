//! Routing metrics: atomic counters exported in Prometheus text format.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide routing metrics.
pub static ROUTING_METRICS: once_cell::sync::Lazy<RoutingMetrics> =
    once_cell::sync::Lazy::new(RoutingMetrics::new);

pub struct RoutingMetrics {
    decisions_total: RwLock<HashMap<(String, String), u64>>,
    fallbacks_total: AtomicU64,
    escalations_total: AtomicU64,
    escalations_refused_total: AtomicU64,
    quota_rejections_total: AtomicU64,
}

impl Default for RoutingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingMetrics {
    pub fn new() -> Self {
        Self {
            decisions_total: RwLock::new(HashMap::new()),
            fallbacks_total: AtomicU64::new(0),
            escalations_total: AtomicU64::new(0),
            escalations_refused_total: AtomicU64::new(0),
            quota_rejections_total: AtomicU64::new(0),
        }
    }

    pub fn record_decision(&self, provider: &str, tier: &str, is_fallback: bool) {
        *self
            .decisions_total
            .write()
            .entry((provider.to_string(), tier.to_string()))
            .or_insert(0) += 1;
        if is_fallback {
            self.fallbacks_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_escalation(&self, granted: bool) {
        if granted {
            self.escalations_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.escalations_refused_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_quota_rejection(&self) {
        self.quota_rejections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fallback_count(&self) -> u64 {
        self.fallbacks_total.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition.
    pub fn export(&self) -> String {
        let mut out = String::new();
        out.push_str("# TYPE routing_decisions_total counter\n");
        for ((provider, tier), count) in self.decisions_total.read().iter() {
            out.push_str(&format!(
                "routing_decisions_total{{provider=\"{provider}\",tier=\"{tier}\"}} {count}\n"
            ));
        }
        out.push_str(&format!(
            "routing_fallbacks_total {}\n",
            self.fallbacks_total.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "routing_escalations_total {}\n",
            self.escalations_total.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "routing_escalations_refused_total {}\n",
            self.escalations_refused_total.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "routing_quota_rejections_total {}\n",
            self.quota_rejections_total.load(Ordering::Relaxed)
        ));
        out
    }
}
