//! Canonical alert - the immutable unit of work entering the platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Alert severity, closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// True for the severities that gate escalation and approval deadlines.
    pub fn is_high_or_critical(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Informational => "informational",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "informational" => Ok(Severity::Informational),
            other => Err(ContractError::InvalidSeverity(other.to_string())),
        }
    }
}

/// A normalized security alert, immutable after ingest.
///
/// Upstream SIEM adapters produce this shape on `alerts.normalized`; nothing
/// downstream ever mutates it. The original payload rides along untouched for
/// evidence packaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalAlert {
    /// Source-assigned alert identity
    pub alert_id: String,
    /// Owning tenant (always present)
    pub tenant_id: String,
    /// Originating source system (e.g. "sentinel", "crowdstrike")
    pub source: String,
    /// Product within the source
    pub product: String,
    /// Alert creation time (RFC 3339)
    pub timestamp: DateTime<Utc>,
    /// Short human title
    pub title: String,
    /// Free-text description - UNTRUSTED, never fed to a model unscanned
    pub description: String,
    /// Severity from the closed vocabulary
    pub severity: Severity,
    /// ATT&CK tactic ids
    #[serde(default)]
    pub tactics: Vec<String>,
    /// ATT&CK / ATLAS technique ids
    #[serde(default)]
    pub techniques: Vec<String>,
    /// Raw entity blob as emitted by the product (opaque until parsing)
    #[serde(default)]
    pub raw_entities: String,
    /// Original payload, verbatim
    #[serde(default)]
    pub original_payload: serde_json::Value,
}

impl CanonicalAlert {
    /// Validate the ingest invariants: tenant present, severity closed-enum
    /// (enforced by the type), timestamp RFC 3339 (enforced by chrono).
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.tenant_id.trim().is_empty() {
            return Err(ContractError::MissingTenant);
        }
        Ok(())
    }

    /// Parse from a raw JSON payload, applying ingest validation.
    pub fn from_json(raw: &str) -> Result<Self, ContractError> {
        let alert: CanonicalAlert = serde_json::from_str(raw)?;
        alert.validate()?;
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        serde_json::json!({
            "alert_id": "a1",
            "tenant_id": "t1",
            "source": "sentinel",
            "product": "defender",
            "timestamp": "2026-07-01T10:00:00Z",
            "title": "Suspicious sign-in",
            "description": "Impossible travel detected",
            "severity": "high",
            "tactics": ["TA0001"],
            "techniques": ["T1078"],
            "raw_entities": "{\"ip\": \"10.0.0.1\"}"
        })
        .to_string()
    }

    #[test]
    fn test_parse_valid_alert() {
        let alert = CanonicalAlert::from_json(&sample_json()).unwrap();
        assert_eq!(alert.alert_id, "a1");
        assert_eq!(alert.severity, Severity::High);
        assert!(alert.severity.is_high_or_critical());
    }

    #[test]
    fn test_missing_tenant_rejected() {
        let raw = sample_json().replace("\"t1\"", "\"\"");
        let err = CanonicalAlert::from_json(&raw).unwrap_err();
        assert!(matches!(err, ContractError::MissingTenant));
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let raw = sample_json().replace("\"high\"", "\"catastrophic\"");
        assert!(CanonicalAlert::from_json(&raw).is_err());
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let raw = sample_json().replace("2026-07-01T10:00:00Z", "last tuesday");
        assert!(CanonicalAlert::from_json(&raw).is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Informational < Severity::Low);
    }
}
