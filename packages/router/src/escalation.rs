//! Escalation budget: sliding-window cap on top-tier re-runs.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Caps escalations to the top tier per hour. Beyond the budget the caller
/// keeps its original routing decision; escalation is an upgrade, never a
/// right.
pub struct EscalationBudget {
    max_per_hour: u32,
    window: Mutex<VecDeque<Instant>>,
}

impl Default for EscalationBudget {
    fn default() -> Self {
        Self::new(10)
    }
}

impl EscalationBudget {
    pub fn new(max_per_hour: u32) -> Self {
        Self {
            max_per_hour,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to consume one escalation. `false` means the budget is spent and
    /// the original decision stands.
    pub fn try_escalate(&self) -> bool {
        let mut window = self.window.lock();
        let cutoff = Instant::now() - Duration::from_secs(3600);
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }
        if window.len() as u32 >= self.max_per_hour {
            return false;
        }
        window.push_back(Instant::now());
        true
    }

    pub fn used_in_window(&self) -> u32 {
        let mut window = self.window.lock();
        let cutoff = Instant::now() - Duration::from_secs(3600);
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }
        window.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eleventh_request_is_refused() {
        let budget = EscalationBudget::new(10);
        for i in 0..10 {
            assert!(budget.try_escalate(), "escalation {i} within budget");
        }
        assert!(!budget.try_escalate(), "11th escalation refused");
        assert_eq!(budget.used_in_window(), 10);
    }

    #[test]
    fn test_custom_budget() {
        let budget = EscalationBudget::new(2);
        assert!(budget.try_escalate());
        assert!(budget.try_escalate());
        assert!(!budget.try_escalate());
    }
}
