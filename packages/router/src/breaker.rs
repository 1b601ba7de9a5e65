//! Per-provider circuit breaker.
//!
//! CLOSED counts consecutive failures and opens at the threshold. OPEN
//! promotes to HALF_OPEN after the recovery timeout (monotonic clock) and
//! admits a single probe. The probe's outcome decides: success closes,
//! failure re-opens. `record_success`/`record_failure` consult the computed
//! current state, not the stored field, so a timed-out OPEN is promoted
//! before the outcome is applied.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_probe_inflight: bool,
}

/// Circuit breaker with a 5-failure threshold and 30s recovery by default.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_probe_inflight: false,
            }),
        }
    }

    fn promote_if_due(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open {
            if let Some(opened) = inner.opened_at {
                if opened.elapsed() >= self.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_probe_inflight = false;
                }
            }
        }
    }

    /// Current state with the timeout promotion applied.
    pub fn current_state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.promote_if_due(&mut inner);
        inner.state
    }

    /// CLOSED and HALF_OPEN admit calls; HALF_OPEN admits one probe.
    pub fn is_available(&self) -> bool {
        let mut inner = self.inner.lock();
        self.promote_if_due(&mut inner);
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if inner.half_open_probe_inflight {
                    false
                } else {
                    inner.half_open_probe_inflight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.promote_if_due(&mut inner);
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_probe_inflight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.promote_if_due(&mut inner);
        match inner.state {
            BreakerState::HalfOpen => {
                // Failed probe: back to OPEN, restart the clock.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_probe_inflight = false;
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }
}
