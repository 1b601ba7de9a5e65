//! Shared drift state consumed by FP matching and sampling.

use std::sync::atomic::{AtomicBool, Ordering};

/// Drift posture, set by the detector, read by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftState {
    Normal,
    Elevated,
}

/// Process-wide adjuster. While drift is elevated, the FP confidence
/// threshold rises from 0.90 to 0.95 and the evaluation sampler multiplies
/// its per-stratum sample size.
#[derive(Debug, Default)]
pub struct ThresholdAdjuster {
    elevated: AtomicBool,
}

impl ThresholdAdjuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: DriftState) {
        self.elevated
            .store(state == DriftState::Elevated, Ordering::Release);
    }

    pub fn state(&self) -> DriftState {
        if self.elevated.load(Ordering::Acquire) {
            DriftState::Elevated
        } else {
            DriftState::Normal
        }
    }

    /// FP confidence threshold under the current drift posture.
    pub fn fp_threshold(&self) -> f64 {
        match self.state() {
            DriftState::Normal => 0.90,
            DriftState::Elevated => 0.95,
        }
    }

    /// Sampling multiplier for the FP evaluation sampler.
    pub fn sampling_multiplier(&self) -> f64 {
        match self.state() {
            DriftState::Normal => 1.0,
            DriftState::Elevated => 2.0,
        }
    }
}
