//! ALUSKORT Governance: the safety controls gating auto-closure.
//!
//! Auto-closing an alert is the single most dangerous thing this platform
//! does. Everything here exists to make that action verifiable (two-person
//! approval, canary measurement), revocable (kill switches, expiry), and
//! measured (stratified evaluation, autonomy guard).

pub mod approval;
pub mod canary;
pub mod error;
pub mod evaluation;
pub mod killswitch;
pub mod matching;
pub mod shadow;

pub use approval::PatternGovernance;
pub use canary::{CanaryRollout, CanarySlice, PatternCanary, SliceKey, SliceStatus};
pub use error::GovernanceError;
pub use evaluation::{
    AutonomyGuard, ClosureRecord, CrossCheck, QualityMeasurement, StratifiedSampler, Stratum,
};
pub use killswitch::{KillSwitchDimension, KillSwitchManager, KillSwitchScope};
pub use matching::{FpMatch, FpMatcher};
pub use shadow::{GoLiveCriteria, ShadowModeManager};
