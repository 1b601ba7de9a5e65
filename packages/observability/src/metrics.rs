//! Platform metrics registry.
//!
//! Gauge and counter state behind typed record methods, exported in
//! Prometheus text format. Initialized once at startup; teardown flushes by
//! exporting a final scrape.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-wide metrics.
pub static PLATFORM_METRICS: once_cell::sync::Lazy<PlatformMetrics> =
    once_cell::sync::Lazy::new(PlatformMetrics::new);

#[derive(Default)]
struct MetricsInner {
    /// audit_chain_valid{tenant,check_type} -> 0|1
    chain_valid: HashMap<(String, String), u8>,
    /// audit_kafka_lag{tenant}
    kafka_lag: HashMap<String, i64>,
    /// audit_verification_duration_seconds{check_type}
    verification_duration: HashMap<String, f64>,
    /// fp_precision{rule_family}
    fp_precision: HashMap<String, f64>,
    /// fp_fnr{rule_family}
    fp_fnr: HashMap<String, f64>,
    /// shadow_agreement{tenant}
    shadow_agreement: HashMap<String, f64>,
    /// tenant_cost_usd{tenant}
    tenant_cost: HashMap<String, f64>,
    /// drift_score{dimension}
    drift_scores: HashMap<String, f64>,
}

#[derive(Default)]
pub struct PlatformMetrics {
    inner: RwLock<MetricsInner>,
}

impl PlatformMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_chain_valid(&self, tenant: &str, check_type: &str, valid: bool) {
        self.inner
            .write()
            .chain_valid
            .insert((tenant.to_string(), check_type.to_string()), valid as u8);
    }

    pub fn chain_valid(&self, tenant: &str, check_type: &str) -> Option<u8> {
        self.inner
            .read()
            .chain_valid
            .get(&(tenant.to_string(), check_type.to_string()))
            .copied()
    }

    pub fn set_kafka_lag(&self, tenant: &str, lag: i64) {
        self.inner.write().kafka_lag.insert(tenant.to_string(), lag);
    }

    pub fn record_verification_duration(&self, check_type: &str, seconds: f64) {
        self.inner
            .write()
            .verification_duration
            .insert(check_type.to_string(), seconds);
    }

    pub fn set_fp_precision(&self, rule_family: &str, precision: f64) {
        self.inner
            .write()
            .fp_precision
            .insert(rule_family.to_string(), precision);
    }

    pub fn set_fp_fnr(&self, rule_family: &str, fnr: f64) {
        self.inner.write().fp_fnr.insert(rule_family.to_string(), fnr);
    }

    pub fn set_shadow_agreement(&self, tenant: &str, rate: f64) {
        self.inner
            .write()
            .shadow_agreement
            .insert(tenant.to_string(), rate);
    }

    pub fn add_tenant_cost(&self, tenant: &str, cost_usd: f64) {
        *self
            .inner
            .write()
            .tenant_cost
            .entry(tenant.to_string())
            .or_insert(0.0) += cost_usd;
    }

    pub fn set_drift_score(&self, dimension: &str, score: f64) {
        self.inner
            .write()
            .drift_scores
            .insert(dimension.to_string(), score);
    }

    /// Prometheus text exposition of every gauge.
    pub fn export(&self) -> String {
        let inner = self.inner.read();
        let mut out = String::new();
        for ((tenant, check), v) in &inner.chain_valid {
            out.push_str(&format!(
                "audit_chain_valid{{tenant=\"{tenant}\",check_type=\"{check}\"}} {v}\n"
            ));
        }
        for (tenant, lag) in &inner.kafka_lag {
            out.push_str(&format!("audit_kafka_lag{{tenant=\"{tenant}\"}} {lag}\n"));
        }
        for (check, secs) in &inner.verification_duration {
            out.push_str(&format!(
                "audit_verification_duration_seconds{{check_type=\"{check}\"}} {secs}\n"
            ));
        }
        for (family, p) in &inner.fp_precision {
            out.push_str(&format!("fp_precision{{rule_family=\"{family}\"}} {p}\n"));
        }
        for (family, f) in &inner.fp_fnr {
            out.push_str(&format!("fp_fnr{{rule_family=\"{family}\"}} {f}\n"));
        }
        for (tenant, rate) in &inner.shadow_agreement {
            out.push_str(&format!("shadow_agreement{{tenant=\"{tenant}\"}} {rate}\n"));
        }
        for (tenant, cost) in &inner.tenant_cost {
            out.push_str(&format!("tenant_cost_usd{{tenant=\"{tenant}\"}} {cost}\n"));
        }
        for (dim, score) in &inner.drift_scores {
            out.push_str(&format!("drift_score{{dimension=\"{dim}\"}} {score}\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_valid_gauge() {
        let metrics = PlatformMetrics::new();
        metrics.set_chain_valid("t1", "full", false);
        assert_eq!(metrics.chain_valid("t1", "full"), Some(0));
        let text = metrics.export();
        assert!(text.contains("audit_chain_valid{tenant=\"t1\",check_type=\"full\"} 0"));
    }

    #[test]
    fn test_cost_accumulates() {
        let metrics = PlatformMetrics::new();
        metrics.add_tenant_cost("t1", 0.25);
        metrics.add_tenant_cost("t1", 0.25);
        assert!(metrics.export().contains("tenant_cost_usd{tenant=\"t1\"} 0.5"));
    }
}
