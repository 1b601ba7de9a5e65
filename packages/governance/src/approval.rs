//! Two-person pattern governance.
//!
//! A new pattern is `Pending`. The first approval records `approved_by_1`;
//! a second approval by a *distinct* approver activates the pattern with a
//! 90-day expiry. Reaffirmation extends by 90 days. `check_expiry` is the
//! only path from `Active` to `Expired`; revoked and expired patterns are
//! terminal within their version.

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use aluskort_persistence::{keys, publish_audit, CacheStore, MessageBus};
use aluskort_schemas::{
    Actor, ActorType, AuditEventEnvelope, AuditEventType, AuditSeverity, FpPattern, PatternStatus,
};

use crate::error::GovernanceError;

const APPROVAL_VALIDITY_DAYS: i64 = 90;

/// Governance API over the pattern registry. The in-memory map is the
/// working set; every mutation writes through to the pattern cache so
/// matchers on other instances converge.
pub struct PatternGovernance {
    patterns: RwLock<HashMap<String, FpPattern>>,
    cache: Arc<dyn CacheStore>,
    bus: Arc<dyn MessageBus>,
}

impl PatternGovernance {
    pub fn new(cache: Arc<dyn CacheStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            cache,
            bus,
        }
    }

    /// Register a new pattern in `Pending`.
    pub async fn submit(&self, mut pattern: FpPattern) -> FpPattern {
        pattern.status = PatternStatus::Pending;
        pattern.approved_by_1 = None;
        pattern.approved_by_2 = None;
        self.write_through(&pattern).await;
        self.patterns
            .write()
            .insert(pattern.pattern_id.clone(), pattern.clone());
        pattern
    }

    pub fn get(&self, pattern_id: &str) -> Option<FpPattern> {
        self.patterns.read().get(pattern_id).cloned()
    }

    /// All patterns, for the matcher.
    pub fn all(&self) -> Vec<FpPattern> {
        self.patterns.read().values().cloned().collect()
    }

    /// Record one approval. Two distinct approvers activate the pattern.
    pub async fn approve(
        &self,
        pattern_id: &str,
        approver: &str,
    ) -> Result<FpPattern, GovernanceError> {
        let updated = {
            let mut patterns = self.patterns.write();
            let pattern = patterns
                .get_mut(pattern_id)
                .ok_or_else(|| GovernanceError::PatternNotFound(pattern_id.to_string()))?;

            match pattern.status {
                PatternStatus::Pending => {
                    pattern.approved_by_1 = Some(approver.to_string());
                    pattern.status = PatternStatus::Approved;
                }
                PatternStatus::Approved => {
                    if pattern.approved_by_1.as_deref() == Some(approver) {
                        return Err(GovernanceError::SameApprover(approver.to_string()));
                    }
                    pattern.approved_by_2 = Some(approver.to_string());
                    pattern.status = PatternStatus::Active;
                    pattern.expiry_date = Some(Utc::now() + Duration::days(APPROVAL_VALIDITY_DAYS));
                }
                status @ (PatternStatus::Expired | PatternStatus::Revoked) => {
                    return Err(GovernanceError::Terminal {
                        pattern_id: pattern_id.to_string(),
                        status,
                    });
                }
                status => {
                    return Err(GovernanceError::WrongStatus {
                        pattern_id: pattern_id.to_string(),
                        status,
                        required: PatternStatus::Pending,
                    });
                }
            }
            pattern.clone()
        };

        self.write_through(&updated).await;
        self.emit_pattern_event(AuditEventType::PatternApproved, &updated, approver)
            .await;
        Ok(updated)
    }

    /// Extend an active pattern's expiry by 90 days.
    pub async fn reaffirm(
        &self,
        pattern_id: &str,
        reaffirmed_by: &str,
    ) -> Result<FpPattern, GovernanceError> {
        let updated = {
            let mut patterns = self.patterns.write();
            let pattern = patterns
                .get_mut(pattern_id)
                .ok_or_else(|| GovernanceError::PatternNotFound(pattern_id.to_string()))?;
            if pattern.status != PatternStatus::Active {
                return Err(GovernanceError::WrongStatus {
                    pattern_id: pattern_id.to_string(),
                    status: pattern.status,
                    required: PatternStatus::Active,
                });
            }
            let base = pattern.expiry_date.unwrap_or_else(Utc::now);
            pattern.expiry_date = Some(base + Duration::days(APPROVAL_VALIDITY_DAYS));
            pattern.reaffirmed_date = Some(Utc::now());
            pattern.reaffirmed_by = Some(reaffirmed_by.to_string());
            pattern.clone()
        };
        self.write_through(&updated).await;
        self.emit_pattern_event(AuditEventType::PatternReaffirmed, &updated, reaffirmed_by)
            .await;
        Ok(updated)
    }

    /// Revoke a pattern. One-way within this version.
    pub async fn revoke(
        &self,
        pattern_id: &str,
        revoked_by: &str,
    ) -> Result<FpPattern, GovernanceError> {
        let updated = {
            let mut patterns = self.patterns.write();
            let pattern = patterns
                .get_mut(pattern_id)
                .ok_or_else(|| GovernanceError::PatternNotFound(pattern_id.to_string()))?;
            if matches!(pattern.status, PatternStatus::Expired | PatternStatus::Revoked) {
                return Err(GovernanceError::Terminal {
                    pattern_id: pattern_id.to_string(),
                    status: pattern.status,
                });
            }
            pattern.status = PatternStatus::Revoked;
            pattern.clone()
        };
        self.write_through(&updated).await;
        self.emit_pattern_event(AuditEventType::PatternRevoked, &updated, revoked_by)
            .await;
        Ok(updated)
    }

    /// Sweep active patterns past expiry into `Expired`. Returns the ids
    /// transitioned. Nothing outside this call enforces expiry.
    pub async fn check_expiry(&self) -> Vec<String> {
        let now = Utc::now();
        let expired: Vec<FpPattern> = {
            let mut patterns = self.patterns.write();
            patterns
                .values_mut()
                .filter(|p| p.status == PatternStatus::Active)
                .filter(|p| p.expiry_date.is_some_and(|e| e < now))
                .map(|p| {
                    p.status = PatternStatus::Expired;
                    p.clone()
                })
                .collect()
        };
        for pattern in &expired {
            self.write_through(pattern).await;
            tracing::info!(pattern_id = %pattern.pattern_id, "pattern expired");
        }
        expired.into_iter().map(|p| p.pattern_id).collect()
    }

    async fn write_through(&self, pattern: &FpPattern) {
        if let Ok(json) = serde_json::to_string(pattern) {
            self.cache
                .set_with_ttl(
                    &keys::fp_pattern(&pattern.pattern_id),
                    &json,
                    std::time::Duration::from_secs(24 * 3600),
                )
                .await;
        }
    }

    async fn emit_pattern_event(&self, event_type: AuditEventType, pattern: &FpPattern, actor: &str) {
        let envelope = AuditEventEnvelope::new(
            pattern
                .scope
                .tenant_id
                .clone()
                .unwrap_or_else(|| "platform".into()),
            "governance",
            event_type,
            AuditSeverity::Info,
            Actor {
                actor_type: ActorType::Human,
                id: actor.to_string(),
                permissions: vec!["pattern_governance".into()],
            },
        )
        .with_decision(serde_json::json!({
            "pattern_id": pattern.pattern_id,
            "status": pattern.status,
            "expiry_date": pattern.expiry_date,
        }));
        if let Err(e) = publish_audit(self.bus.as_ref(), &envelope).await {
            tracing::error!(error = %e, "pattern governance audit emission failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aluskort_persistence::{InMemoryBus, MemoryCache};

    fn governance() -> PatternGovernance {
        PatternGovernance::new(Arc::new(MemoryCache::new()), Arc::new(InMemoryBus::new()))
    }

    #[tokio::test]
    async fn test_two_distinct_approvers_activate() {
        let gov = governance();
        gov.submit(FpPattern::new("fp-001")).await;

        let after_first = gov.approve("fp-001", "alice").await.unwrap();
        assert_eq!(after_first.status, PatternStatus::Approved);
        assert_eq!(after_first.approved_by_1.as_deref(), Some("alice"));

        let after_second = gov.approve("fp-001", "bob").await.unwrap();
        assert_eq!(after_second.status, PatternStatus::Active);
        assert_eq!(after_second.approved_by_2.as_deref(), Some("bob"));
        assert!(after_second.expiry_date.is_some());
    }

    #[tokio::test]
    async fn test_same_approver_twice_rejected() {
        let gov = governance();
        gov.submit(FpPattern::new("fp-001")).await;
        gov.approve("fp-001", "alice").await.unwrap();

        let err = gov.approve("fp-001", "alice").await.unwrap_err();
        assert!(matches!(err, GovernanceError::SameApprover(_)));
        assert_eq!(gov.get("fp-001").unwrap().status, PatternStatus::Approved);
    }

    #[tokio::test]
    async fn test_reaffirm_extends_ninety_days() {
        let gov = governance();
        gov.submit(FpPattern::new("fp-001")).await;
        gov.approve("fp-001", "alice").await.unwrap();
        let activated = gov.approve("fp-001", "bob").await.unwrap();
        let original_expiry = activated.expiry_date.unwrap();

        let reaffirmed = gov.reaffirm("fp-001", "carol").await.unwrap();
        let extended = reaffirmed.expiry_date.unwrap();
        assert_eq!((extended - original_expiry).num_days(), 90);
        assert_eq!(reaffirmed.reaffirmed_by.as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn test_check_expiry_sweeps_active() {
        let gov = governance();
        gov.submit(FpPattern::new("fp-001")).await;
        gov.approve("fp-001", "alice").await.unwrap();
        gov.approve("fp-001", "bob").await.unwrap();

        // Force the expiry into the past
        {
            let mut patterns = gov.patterns.write();
            patterns.get_mut("fp-001").unwrap().expiry_date =
                Some(Utc::now() - Duration::days(1));
        }

        let expired = gov.check_expiry().await;
        assert_eq!(expired, vec!["fp-001"]);
        assert_eq!(gov.get("fp-001").unwrap().status, PatternStatus::Expired);
    }

    #[tokio::test]
    async fn test_expired_is_terminal() {
        let gov = governance();
        gov.submit(FpPattern::new("fp-001")).await;
        gov.approve("fp-001", "alice").await.unwrap();
        gov.approve("fp-001", "bob").await.unwrap();
        {
            let mut patterns = gov.patterns.write();
            patterns.get_mut("fp-001").unwrap().expiry_date =
                Some(Utc::now() - Duration::days(1));
        }
        gov.check_expiry().await;

        assert!(matches!(
            gov.approve("fp-001", "carol").await.unwrap_err(),
            GovernanceError::Terminal { .. }
        ));
        assert!(matches!(
            gov.revoke("fp-001", "carol").await.unwrap_err(),
            GovernanceError::Terminal { .. }
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_one_way() {
        let gov = governance();
        gov.submit(FpPattern::new("fp-001")).await;
        gov.revoke("fp-001", "oncall").await.unwrap();
        assert!(matches!(
            gov.approve("fp-001", "alice").await.unwrap_err(),
            GovernanceError::Terminal { .. }
        ));
    }
}
