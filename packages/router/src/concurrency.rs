//! Backpressure: per-priority concurrency slots, per-priority RPM windows,
//! and per-tenant hourly quotas.
//!
//! Slots and RPM block until capacity frees. The tenant quota is the one
//! limit that errors instead of blocking - a tenant over its hourly budget
//! should see a typed refusal, not a stall.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use aluskort_schemas::{Priority, TenantTier};

use crate::error::RouterError;

/// Held while a call is in flight; dropping releases the slot.
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
}

struct RpmWindow {
    limit: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RpmWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Time until a slot frees, or zero if one is free now.
    fn wait_needed(&self) -> Duration {
        let mut stamps = self.timestamps.lock();
        let cutoff = Instant::now() - Duration::from_secs(60);
        while stamps.front().is_some_and(|t| *t < cutoff) {
            stamps.pop_front();
        }
        if (stamps.len() as u32) < self.limit {
            stamps.push_back(Instant::now());
            Duration::ZERO
        } else {
            // Front is the oldest inside the window
            let oldest = *stamps.front().expect("window non-empty at limit");
            (oldest + Duration::from_secs(60)).saturating_duration_since(Instant::now())
        }
    }
}

/// Per-priority slots and RPM limits.
pub struct ConcurrencyController {
    slots: HashMap<Priority, Arc<Semaphore>>,
    rpm: HashMap<Priority, RpmWindow>,
}

impl Default for ConcurrencyController {
    fn default() -> Self {
        Self::new(
            [(Priority::Critical, 8), (Priority::High, 6), (Priority::Normal, 4), (Priority::Low, 2)],
            [(Priority::Critical, 200), (Priority::High, 100), (Priority::Normal, 50), (Priority::Low, 20)],
        )
    }
}

impl ConcurrencyController {
    pub fn new(
        slot_limits: [(Priority, usize); 4],
        rpm_limits: [(Priority, u32); 4],
    ) -> Self {
        Self {
            slots: slot_limits
                .into_iter()
                .map(|(p, n)| (p, Arc::new(Semaphore::new(n))))
                .collect(),
            rpm: rpm_limits
                .into_iter()
                .map(|(p, n)| (p, RpmWindow::new(n)))
                .collect(),
        }
    }

    /// Acquire a slot for `priority`, blocking until both a concurrency slot
    /// and an RPM slot are available.
    pub async fn acquire(&self, priority: Priority) -> SlotPermit {
        let semaphore = self.slots[&priority].clone();
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("controller semaphores are never closed");

        loop {
            let wait = self.rpm[&priority].wait_needed();
            if wait.is_zero() {
                break;
            }
            tokio::time::sleep(wait).await;
        }

        SlotPermit { _permit: permit }
    }

    pub fn available_slots(&self, priority: Priority) -> usize {
        self.slots[&priority].available_permits()
    }
}

/// Sliding-window hourly quota per tenant.
pub struct TenantQuota {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for TenantQuota {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantQuota {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn hourly_limit(tier: TenantTier) -> u32 {
        match tier {
            TenantTier::Premium => 500,
            TenantTier::Standard => 100,
            TenantTier::Trial => 20,
        }
    }

    /// Admit or refuse a call for `tenant_id` at `tier`.
    pub fn check(&self, tenant_id: &str, tier: TenantTier) -> Result<(), RouterError> {
        let limit = Self::hourly_limit(tier);
        let mut windows = self.windows.lock();
        let window = windows.entry(tenant_id.to_string()).or_default();
        let cutoff = Instant::now() - Duration::from_secs(3600);
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }
        if window.len() as u32 >= limit {
            return Err(RouterError::QuotaExceeded {
                tenant_id: tenant_id.to_string(),
                limit,
            });
        }
        window.push_back(Instant::now());
        Ok(())
    }
}
