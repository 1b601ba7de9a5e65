//! Consequence graph seam.
//!
//! Consequence reasoning ("what breaks if this asset is contained?") runs
//! against a graph service. On outage the client answers from a static YAML
//! zone table so containment decisions never block on graph availability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use aluskort_schemas::Severity;

use crate::error::StoreError;

/// A zone-level consequence of acting on an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consequence {
    pub zone: String,
    pub consequence: String,
    pub severity: Severity,
}

#[async_trait]
pub trait ConsequenceGraph: Send + Sync {
    async fn consequences(&self, zone: &str) -> Result<Vec<Consequence>, StoreError>;
}

/// Static YAML-backed fallback table.
///
/// Format:
/// ```yaml
/// dmz:
///   - consequence: "public services interrupted"
///     severity: high
/// ```
#[derive(Debug, Clone)]
pub struct StaticConsequenceTable {
    zones: HashMap<String, Vec<Consequence>>,
}

#[derive(Debug, Deserialize)]
struct YamlConsequence {
    consequence: String,
    severity: Severity,
}

impl StaticConsequenceTable {
    pub fn from_yaml(yaml: &str) -> Result<Self, StoreError> {
        let raw: HashMap<String, Vec<YamlConsequence>> = serde_yaml::from_str(yaml)
            .map_err(|e| StoreError::Validation(format!("consequence table: {e}")))?;
        let zones = raw
            .into_iter()
            .map(|(zone, entries)| {
                let consequences = entries
                    .into_iter()
                    .map(|e| Consequence {
                        zone: zone.clone(),
                        consequence: e.consequence,
                        severity: e.severity,
                    })
                    .collect();
                (zone, consequences)
            })
            .collect();
        Ok(Self { zones })
    }

    /// Built-in defaults covering the standard network zones.
    pub fn builtin() -> Self {
        Self::from_yaml(DEFAULT_TABLE).unwrap_or(Self {
            zones: HashMap::new(),
        })
    }
}

const DEFAULT_TABLE: &str = r#"
dmz:
  - consequence: "public-facing services interrupted"
    severity: high
production:
  - consequence: "customer workloads degraded"
    severity: critical
  - consequence: "revenue pipeline paused"
    severity: high
corporate:
  - consequence: "employee access disrupted"
    severity: medium
lab:
  - consequence: "test environments unavailable"
    severity: low
"#;

#[async_trait]
impl ConsequenceGraph for StaticConsequenceTable {
    async fn consequences(&self, zone: &str) -> Result<Vec<Consequence>, StoreError> {
        Ok(self.zones.get(zone).cloned().unwrap_or_default())
    }
}

/// Client that prefers the live graph and falls back to the static table on
/// any transient failure.
pub struct GraphClient<G: ConsequenceGraph> {
    live: Option<G>,
    fallback: StaticConsequenceTable,
}

impl<G: ConsequenceGraph> GraphClient<G> {
    pub fn new(live: Option<G>, fallback: StaticConsequenceTable) -> Self {
        Self { live, fallback }
    }

    pub async fn consequences(&self, zone: &str) -> Vec<Consequence> {
        if let Some(live) = &self.live {
            match live.consequences(zone).await {
                Ok(c) => return c,
                Err(e) => {
                    tracing::warn!(zone = %zone, error = %e, "graph unavailable, using static table");
                }
            }
        }
        self.fallback
            .consequences(zone)
            .await
            .unwrap_or_default()
    }
}
