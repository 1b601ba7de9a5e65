//! ALUSKORT Gateway: the trust boundary in front of every model call.
//!
//! Nothing upstream is trusted. Alert text, retrieved memory, and vendor
//! payloads all pass through the same ordered pipeline:
//!
//! 1. Spend guard (hard cap rejects, soft cap alerts once)
//! 2. Injection classification (regex, optional LLM second opinion)
//! 3. Transform instead of redact (summarize or quarantine, no oracle tokens)
//! 4. PII redaction with a reversible placeholder map
//! 5. Evidence isolation inside an escaped `<evidence>` block
//! 6. Tier-scaled token budgeting
//! 7. Provider adaptation and the model call
//! 8. Deanonymisation of placeholders in the response
//! 9. Output validation against the technique taxonomy

pub mod adapter;
pub mod budget;
pub mod error;
pub mod evidence;
pub mod gateway;
pub mod injection;
pub mod pii;
pub mod taxonomy;
pub mod transform;

pub use adapter::{
    AnthropicAdapter, ModelInvoker, ModelOutput, OpenAiAdapter, PromptAdapter, ProviderRequest,
};
pub use budget::{PromptBudgeter, SpendGuard, TierBudget};
pub use error::GatewayError;
pub use gateway::{ContextGateway, GatewayMetrics, GatewayRequest, GatewayResponse};
pub use injection::{GuardAction, InjectionClassifier, InjectionRisk, InjectionScan, SecondOpinion};
pub use pii::{PiiRedactor, RedactionMap};
pub use taxonomy::{TaxonomySource, TechniqueValidator, ValidationOutcome};
pub use transform::{extract_entities, summarize_untrusted, QUARANTINE_PLACEHOLDER};
