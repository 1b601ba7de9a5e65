//! Environment-driven platform configuration. No secrets in code.

use std::collections::HashMap;
use std::env;

use crate::error::StoreError;

/// Connection and policy configuration shared by the service binaries.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub bus_bootstrap: String,
    pub store_dsn: String,
    pub cache_url: String,
    pub vector_endpoint: String,
    pub object_store_endpoint: String,
    pub object_store_bucket: String,
    pub kms_key_id: String,
    /// 32-byte key for redaction-map encryption, base64
    pub pii_redaction_key: String,
    /// provider name -> credential, from `ALUSKORT_PROVIDER_<NAME>_KEY`
    pub provider_credentials: HashMap<String, String>,
    pub monthly_spend_soft_usd: f64,
    pub monthly_spend_hard_usd: f64,
    /// New tenants start in shadow unless explicitly overridden
    pub shadow_mode_default: bool,
}

fn required(name: &str) -> Result<String, StoreError> {
    env::var(name).map_err(|_| StoreError::Validation(format!("missing required env var {name}")))
}

impl PlatformConfig {
    pub fn from_env() -> Result<Self, StoreError> {
        let provider_credentials = env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix("ALUSKORT_PROVIDER_")
                    .and_then(|rest| rest.strip_suffix("_KEY"))
                    .map(|name| (name.to_lowercase(), v.clone()))
            })
            .collect();

        Ok(Self {
            bus_bootstrap: required("ALUSKORT_BUS_BOOTSTRAP")?,
            store_dsn: required("ALUSKORT_STORE_DSN")?,
            cache_url: required("ALUSKORT_CACHE_URL")?,
            vector_endpoint: required("ALUSKORT_VECTOR_ENDPOINT")?,
            object_store_endpoint: required("ALUSKORT_OBJECT_STORE_ENDPOINT")?,
            object_store_bucket: required("ALUSKORT_OBJECT_STORE_BUCKET")?,
            kms_key_id: required("ALUSKORT_KMS_KEY_ID")?,
            pii_redaction_key: required("ALUSKORT_PII_REDACTION_KEY")?,
            provider_credentials,
            monthly_spend_soft_usd: env::var("ALUSKORT_SPEND_SOFT_USD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8_000.0),
            monthly_spend_hard_usd: env::var("ALUSKORT_SPEND_HARD_USD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000.0),
            shadow_mode_default: env::var("ALUSKORT_SHADOW_DEFAULT")
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(true),
        })
    }
}
