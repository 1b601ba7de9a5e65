//! Cost guard and prompt token budgeting.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Token budget by model tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierBudget {
    Tier0,
    Tier1,
    Tier1Plus,
}

impl TierBudget {
    pub fn max_tokens(&self) -> usize {
        match self {
            TierBudget::Tier0 => 4096,
            TierBudget::Tier1 => 8192,
            TierBudget::Tier1Plus => 16384,
        }
    }
}

/// Monthly spend guard. The hard cap rejects; the soft threshold fires a
/// one-shot alert through the provided hook.
pub struct SpendGuard {
    soft_usd: f64,
    hard_usd: f64,
    state: Mutex<SpendState>,
}

#[derive(Default)]
struct SpendState {
    spent_usd: f64,
    soft_alerted: bool,
}

impl SpendGuard {
    pub fn new(soft_usd: f64, hard_usd: f64) -> Self {
        Self {
            soft_usd,
            hard_usd,
            state: Mutex::new(SpendState::default()),
        }
    }

    /// Admit or refuse a call before it is made. `on_soft_alert` fires at
    /// most once per month-window when the soft threshold is crossed.
    pub fn check(&self, mut on_soft_alert: impl FnMut(f64)) -> Result<(), GatewayError> {
        let mut state = self.state.lock();
        if state.spent_usd >= self.hard_usd {
            return Err(GatewayError::SpendLimitExceeded {
                spent: state.spent_usd,
                cap: self.hard_usd,
            });
        }
        if state.spent_usd >= self.soft_usd && !state.soft_alerted {
            state.soft_alerted = true;
            on_soft_alert(state.spent_usd);
        }
        Ok(())
    }

    /// Record realized cost after a call completes.
    pub fn record(&self, cost_usd: f64) {
        self.state.lock().spent_usd += cost_usd;
    }

    pub fn spent(&self) -> f64 {
        self.state.lock().spent_usd
    }

    /// Month rollover: reset counters and re-arm the soft alert.
    pub fn reset_window(&self) {
        let mut state = self.state.lock();
        state.spent_usd = 0.0;
        state.soft_alerted = false;
    }
}

/// Assembles a prompt inside a tier-scaled token window. Retrieval context
/// is the flexible part: it truncates to whatever remains after the fixed
/// sections are reserved.
pub struct PromptBudgeter {
    /// Tokens reserved for system prompt, instructions, and evidence overhead
    reserved_overhead: usize,
}

impl Default for PromptBudgeter {
    fn default() -> Self {
        Self {
            reserved_overhead: 1024,
        }
    }
}

impl PromptBudgeter {
    pub fn new(reserved_overhead: usize) -> Self {
        Self { reserved_overhead }
    }

    /// Approximate tokens for budgeting (4 bytes per token heuristic).
    pub fn estimate_tokens(text: &str) -> usize {
        text.len().div_ceil(4)
    }

    /// Truncate `retrieval` so the whole prompt fits the tier window after
    /// reserving the fixed sections. Truncation is at a whole-chunk boundary;
    /// chunks are dropped from the tail (lowest relevance last).
    pub fn fit_retrieval(
        &self,
        tier: TierBudget,
        fixed_sections: &[&str],
        retrieval: Vec<String>,
    ) -> Vec<String> {
        let fixed_tokens: usize = fixed_sections
            .iter()
            .map(|s| Self::estimate_tokens(s))
            .sum::<usize>()
            + self.reserved_overhead;
        let available = tier.max_tokens().saturating_sub(fixed_tokens);

        let mut used = 0;
        let mut kept = Vec::new();
        for chunk in retrieval {
            let cost = Self::estimate_tokens(&chunk);
            if used + cost > available {
                break;
            }
            used += cost;
            kept.push(chunk);
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_budgets() {
        assert_eq!(TierBudget::Tier0.max_tokens(), 4096);
        assert_eq!(TierBudget::Tier1.max_tokens(), 8192);
        assert_eq!(TierBudget::Tier1Plus.max_tokens(), 16384);
    }

    #[test]
    fn test_hard_cap_rejects() {
        let guard = SpendGuard::new(50.0, 100.0);
        guard.record(100.0);
        let err = guard.check(|_| {}).unwrap_err();
        assert!(matches!(err, GatewayError::SpendLimitExceeded { .. }));
    }

    #[test]
    fn test_soft_alert_fires_once() {
        let guard = SpendGuard::new(50.0, 100.0);
        guard.record(60.0);
        let mut alerts = 0;
        guard.check(|_| alerts += 1).unwrap();
        guard.check(|_| alerts += 1).unwrap();
        assert_eq!(alerts, 1);
    }

    #[test]
    fn test_window_reset_rearms() {
        let guard = SpendGuard::new(50.0, 100.0);
        guard.record(60.0);
        let mut alerts = 0;
        guard.check(|_| alerts += 1).unwrap();
        guard.reset_window();
        guard.record(55.0);
        guard.check(|_| alerts += 1).unwrap();
        assert_eq!(alerts, 2);
        assert!((guard.spent() - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_retrieval_truncates_to_fit() {
        let budgeter = PromptBudgeter::new(1024);
        let chunk = "x".repeat(4096); // ~1024 tokens each
        let retrieval = vec![chunk.clone(), chunk.clone(), chunk.clone(), chunk.clone()];
        let kept = budgeter.fit_retrieval(TierBudget::Tier0, &["system prompt"], retrieval);
        // 4096 window - 1024 reserve - small fixed = ~2 chunks
        assert!(kept.len() < 4);
        assert!(!kept.is_empty());
    }

    #[test]
    fn test_larger_tier_keeps_more() {
        let budgeter = PromptBudgeter::new(1024);
        let chunk = "x".repeat(4096);
        let retrieval: Vec<String> = (0..8).map(|_| chunk.clone()).collect();
        let small = budgeter
            .fit_retrieval(TierBudget::Tier0, &[], retrieval.clone())
            .len();
        let large = budgeter.fit_retrieval(TierBudget::Tier1Plus, &[], retrieval).len();
        assert!(large > small);
    }
}
