//! ALUSKORT Observability: metric registries, drift detection, and the
//! shadow-agreement tracking that gates autonomy expansion.

pub mod agreement;
pub mod drift;
pub mod metrics;
pub mod threshold;

pub use agreement::{AgreementTracker, ShadowAgreement};
pub use drift::{Distribution, DriftDetector, DriftDetectorConfig, DriftReport};
pub use drift::jensen_shannon;
pub use metrics::{PlatformMetrics, PLATFORM_METRICS};
pub use threshold::{DriftState, ThresholdAdjuster};
