//! Shadow agreement tracking.
//!
//! While a tenant or rule family runs in shadow, every automated decision is
//! paired with the analyst's eventual decision by investigation id. The
//! agreement rate over a lookback window is a go-live criterion.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One paired shadow decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowAgreement {
    pub investigation_id: Uuid,
    pub tenant_id: String,
    pub rule_family: Option<String>,
    pub shadow_decision: String,
    pub analyst_decision: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ShadowAgreement {
    pub fn agreed(&self) -> Option<bool> {
        self.analyst_decision
            .as_ref()
            .map(|a| a == &self.shadow_decision)
    }
}

/// In-memory pairing store keyed by investigation.
#[derive(Default)]
pub struct AgreementTracker {
    records: RwLock<HashMap<Uuid, ShadowAgreement>>,
}

impl AgreementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the automated side of the pair.
    pub fn record_shadow(
        &self,
        investigation_id: Uuid,
        tenant_id: impl Into<String>,
        rule_family: Option<String>,
        shadow_decision: impl Into<String>,
    ) {
        self.records.write().insert(
            investigation_id,
            ShadowAgreement {
                investigation_id,
                tenant_id: tenant_id.into(),
                rule_family,
                shadow_decision: shadow_decision.into(),
                analyst_decision: None,
                recorded_at: Utc::now(),
                resolved_at: None,
            },
        );
    }

    /// Record the analyst's decision for a prior shadow decision.
    /// Returns false when no shadow decision exists for the investigation.
    pub fn record_analyst(&self, investigation_id: Uuid, analyst_decision: impl Into<String>) -> bool {
        let mut records = self.records.write();
        match records.get_mut(&investigation_id) {
            Some(record) => {
                record.analyst_decision = Some(analyst_decision.into());
                record.resolved_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Agreement rate for a tenant over the lookback window. `None` when no
    /// resolved pairs exist.
    pub fn agreement_rate(&self, tenant_id: &str, lookback: Duration) -> Option<f64> {
        let cutoff = Utc::now() - lookback;
        let records = self.records.read();
        let resolved: Vec<&ShadowAgreement> = records
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.recorded_at >= cutoff)
            .filter(|r| r.analyst_decision.is_some())
            .collect();
        if resolved.is_empty() {
            return None;
        }
        let agreed = resolved.iter().filter(|r| r.agreed() == Some(true)).count();
        Some(agreed as f64 / resolved.len() as f64)
    }

    /// Agreement rate for a rule family across tenants.
    pub fn agreement_rate_for_family(&self, rule_family: &str, lookback: Duration) -> Option<f64> {
        let cutoff = Utc::now() - lookback;
        let records = self.records.read();
        let resolved: Vec<&ShadowAgreement> = records
            .values()
            .filter(|r| r.rule_family.as_deref() == Some(rule_family) && r.recorded_at >= cutoff)
            .filter(|r| r.analyst_decision.is_some())
            .collect();
        if resolved.is_empty() {
            return None;
        }
        let agreed = resolved.iter().filter(|r| r.agreed() == Some(true)).count();
        Some(agreed as f64 / resolved.len() as f64)
    }

    pub fn unresolved_count(&self, tenant_id: &str) -> usize {
        self.records
            .read()
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.analyst_decision.is_none())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_rate() {
        let tracker = AgreementTracker::new();
        let ids: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            tracker.record_shadow(*id, "t1", None, "false_positive");
        }
        for (i, id) in ids.iter().enumerate() {
            let analyst = if i < 9 { "false_positive" } else { "true_positive" };
            tracker.record_analyst(*id, analyst);
        }
        let rate = tracker.agreement_rate("t1", Duration::days(14)).unwrap();
        assert!((rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_no_resolved_pairs_is_none() {
        let tracker = AgreementTracker::new();
        tracker.record_shadow(Uuid::new_v4(), "t1", None, "false_positive");
        assert!(tracker.agreement_rate("t1", Duration::days(14)).is_none());
        assert_eq!(tracker.unresolved_count("t1"), 1);
    }

    #[test]
    fn test_analyst_without_shadow_is_rejected() {
        let tracker = AgreementTracker::new();
        assert!(!tracker.record_analyst(Uuid::new_v4(), "benign"));
    }

    #[test]
    fn test_family_rate_isolated() {
        let tracker = AgreementTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        tracker.record_shadow(a, "t1", Some("phishing".into()), "fp");
        tracker.record_shadow(b, "t1", Some("malware".into()), "fp");
        tracker.record_analyst(a, "fp");
        tracker.record_analyst(b, "tp");
        assert_eq!(
            tracker.agreement_rate_for_family("phishing", Duration::days(14)),
            Some(1.0)
        );
        assert_eq!(
            tracker.agreement_rate_for_family("malware", Duration::days(14)),
            Some(0.0)
        );
    }
}
