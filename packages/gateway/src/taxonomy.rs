//! Output validation against the technique taxonomy.
//!
//! Technique ids are extracted with a closed regex and checked against the
//! taxonomy set loaded from the store. Unknown ids are quarantined: stripped
//! from every automation-driving field, retained in `raw_output`, and
//! reported for audit. Quarantine never raises.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// ATT&CK (`T1059`, `T1059.001`) and ATLAS (`AML.T0051`, `AML.T0051.000`) ids.
static TECHNIQUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:AML\.T\d{4}(?:\.\d{3})?|T\d{4}(?:\.\d{3})?)\b").expect("technique regex")
});

/// Source of truth for valid technique ids.
#[async_trait]
pub trait TaxonomySource: Send + Sync {
    async fn load(&self) -> Result<(HashSet<String>, String), String>;
}

/// Outcome of validating one model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Output with quarantined ids removed; safe for automation
    pub content: String,
    pub valid_ids: Vec<String>,
    pub quarantined_ids: Vec<String>,
    pub taxonomy_version: String,
}

struct TaxonomyState {
    ids: HashSet<String>,
    version: String,
    loaded_at: Instant,
}

/// Validator with a periodically refreshed taxonomy set.
pub struct TechniqueValidator {
    source: Box<dyn TaxonomySource>,
    refresh_interval: Duration,
    state: RwLock<Option<TaxonomyState>>,
}

impl TechniqueValidator {
    pub fn new(source: Box<dyn TaxonomySource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            state: RwLock::new(None),
        }
    }

    async fn ensure_fresh(&self) {
        let stale = {
            let state = self.state.read();
            match state.as_ref() {
                Some(s) => s.loaded_at.elapsed() > self.refresh_interval,
                None => true,
            }
        };
        if stale {
            match self.source.load().await {
                Ok((ids, version)) => {
                    *self.state.write() = Some(TaxonomyState {
                        ids,
                        version,
                        loaded_at: Instant::now(),
                    });
                }
                Err(e) => {
                    // Keep the previous set; an empty set would quarantine
                    // every technique on a store blip.
                    tracing::warn!(error = %e, "taxonomy refresh failed, keeping previous set");
                }
            }
        }
    }

    /// Validate `output`. Unknown ids are removed from the returned content.
    pub async fn validate(&self, output: &str) -> ValidationOutcome {
        self.ensure_fresh().await;
        let state = self.state.read();
        let (ids, version) = match state.as_ref() {
            Some(s) => (&s.ids, s.version.clone()),
            None => {
                // Never validated and the source is down: quarantine all ids.
                return Self::quarantine_all(output);
            }
        };

        let mut valid = Vec::new();
        let mut quarantined = Vec::new();
        for m in TECHNIQUE_RE.find_iter(output) {
            let id = m.as_str().to_string();
            if ids.contains(&id) {
                if !valid.contains(&id) {
                    valid.push(id);
                }
            } else if !quarantined.contains(&id) {
                quarantined.push(id);
            }
        }

        let mut content = output.to_string();
        for id in &quarantined {
            content = content.replace(id.as_str(), "");
        }

        ValidationOutcome {
            content,
            valid_ids: valid,
            quarantined_ids: quarantined,
            taxonomy_version: version,
        }
    }

    fn quarantine_all(output: &str) -> ValidationOutcome {
        let mut quarantined = Vec::new();
        let mut content = output.to_string();
        for m in TECHNIQUE_RE.find_iter(output) {
            let id = m.as_str().to_string();
            if !quarantined.contains(&id) {
                quarantined.push(id);
            }
        }
        for id in &quarantined {
            content = content.replace(id.as_str(), "");
        }
        ValidationOutcome {
            content,
            valid_ids: Vec::new(),
            quarantined_ids: quarantined,
            taxonomy_version: "unavailable".into(),
        }
    }
}
