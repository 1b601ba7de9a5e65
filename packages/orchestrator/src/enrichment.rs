//! Parallel enrichment fan-out.
//!
//! Enrichers run concurrently with per-enricher isolation: one failing or
//! timing out is recorded to the decision chain and does not block the
//! others. Results merge into `GraphState`; chain ordering reflects
//! completion order.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use aluskort_schemas::investigation::{AtlasMatch, CtemExposure, IocHit, SimilarIncident, UebaRisk};
use aluskort_schemas::{AttestationStatus, GraphState};

/// What one enricher contributes.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentOutput {
    pub ioc_hits: Vec<IocHit>,
    pub ueba_risk: Option<UebaRisk>,
    pub ctem_exposures: Vec<CtemExposure>,
    pub atlas_matches: Vec<AtlasMatch>,
    pub similar_incidents: Vec<SimilarIncident>,
    pub candidate_playbooks: Vec<String>,
    /// Attestation of the telemetry behind this output
    pub attestation: AttestationStatus,
}

/// One independent enrichment source.
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enrich(&self, state: &GraphState) -> Result<EnrichmentOutput, String>;
}

fn merge(state: &mut GraphState, output: EnrichmentOutput) {
    state.ioc_hits.extend(output.ioc_hits);
    if output.ueba_risk.is_some() {
        state.ueba_risk = output.ueba_risk;
    }
    state.ctem_exposures.extend(output.ctem_exposures);
    state.atlas_matches.extend(output.atlas_matches);
    state.similar_incidents.extend(output.similar_incidents);
    state.candidate_playbooks.extend(output.candidate_playbooks);
}

/// Fan out all enrichers against a snapshot of the state, merging results as
/// they complete. Returns the number of successful enrichers.
pub async fn run_enrichment(
    state: &mut GraphState,
    enrichers: &[Arc<dyn Enricher>],
    per_enricher_timeout: Duration,
    taxonomy_version: &str,
) -> usize {
    let snapshot = state.clone();
    let mut join_set = JoinSet::new();

    for enricher in enrichers {
        let enricher = enricher.clone();
        let snapshot = snapshot.clone();
        join_set.spawn(async move {
            let name = enricher.name();
            let result = tokio::time::timeout(per_enricher_timeout, enricher.enrich(&snapshot)).await;
            match result {
                Ok(Ok(output)) => (name, Ok(output)),
                Ok(Err(e)) => (name, Err(e)),
                Err(_) => (name, Err(format!("timed out after {per_enricher_timeout:?}"))),
            }
        });
    }

    let mut succeeded = 0;
    // Completion order, not spawn order: the chain records reality.
    while let Some(joined) = join_set.join_next().await {
        let Ok((name, result)) = joined else {
            tracing::error!("enricher task panicked");
            continue;
        };
        match result {
            Ok(output) => {
                let attestation = output.attestation;
                let summary = serde_json::json!({
                    "enricher": name,
                    "ioc_hits": output.ioc_hits.len(),
                    "ctem_exposures": output.ctem_exposures.len(),
                    "atlas_matches": output.atlas_matches.len(),
                });
                merge(state, output);
                state.append_note(
                    format!("enricher.{name}"),
                    taxonomy_version,
                    attestation,
                    summary,
                );
                succeeded += 1;
            }
            Err(error) => {
                tracing::warn!(enricher = name, error = %error, "enricher failed, continuing");
                state.append_note(
                    format!("enricher.{name}"),
                    taxonomy_version,
                    AttestationStatus::NotApplicable,
                    serde_json::json!({"error": error}),
                );
            }
        }
        state.queries_executed += 1;
    }
    succeeded
}
