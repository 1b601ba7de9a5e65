//! Vector store seam: filtered k-NN with embedding-version hygiene.
//!
//! Every upsert must carry its embedding provenance; searches always filter
//! (tenant at minimum). The dual-read client covers the migration window
//! between embedding versions, merging by `doc_id` and preferring the target
//! version.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StoreError;

/// Embedding provenance carried on every point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingVersion {
    pub embedding_model_id: String,
    pub embedding_dimensions: usize,
    pub embedding_version: u32,
}

/// A point in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub doc_id: String,
    pub tenant_id: String,
    pub embedding: Vec<f32>,
    pub version: EmbeddingVersion,
    pub payload: serde_json::Value,
}

/// Mandatory search filter. Tenant isolation is not optional.
#[derive(Debug, Clone)]
pub struct VectorFilter {
    pub tenant_id: String,
    /// Restrict to a specific embedding version (migration reads)
    pub embedding_version: Option<u32>,
}

/// A scored search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub point: VectorPoint,
    pub score: f64,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError>;

    /// Cosine k-NN under a mandatory filter.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        filter: &VectorFilter,
        k: usize,
    ) -> Result<Vec<VectorHit>, StoreError>;

    /// All points in a collection for a tenant (migration scans).
    async fn scroll(&self, collection: &str, tenant_id: &str) -> Result<Vec<VectorPoint>, StoreError>;
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (dot / (na * nb)) as f64
}

/// In-memory store with exact cosine scoring.
#[derive(Default, Clone)]
pub struct MemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, HashMap<String, VectorPoint>>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        for p in &points {
            if p.embedding.len() != p.version.embedding_dimensions {
                return Err(StoreError::Validation(format!(
                    "point {} embedding has {} dims, version declares {}",
                    p.doc_id,
                    p.embedding.len(),
                    p.version.embedding_dimensions
                )));
            }
        }
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        for p in points {
            // Keyed by doc_id + version so both sides of a migration coexist
            let key = format!("{}@{}", p.doc_id, p.version.embedding_version);
            coll.insert(key, p);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        filter: &VectorFilter,
        k: usize,
    ) -> Result<Vec<VectorHit>, StoreError> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<VectorHit> = coll
            .values()
            .filter(|p| p.tenant_id == filter.tenant_id)
            .filter(|p| {
                filter
                    .embedding_version
                    .is_none_or(|v| p.version.embedding_version == v)
            })
            .map(|p| VectorHit {
                point: p.clone(),
                score: cosine(query, &p.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn scroll(&self, collection: &str, tenant_id: &str) -> Result<Vec<VectorPoint>, StoreError> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|c| {
                c.values()
                    .filter(|p| p.tenant_id == tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Dual-read client for the embedding migration window: query both versions,
/// merge by `doc_id`, prefer the target.
pub struct DualReadVectorClient<S: VectorStore> {
    store: S,
    source_version: u32,
    target_version: u32,
}

impl<S: VectorStore> DualReadVectorClient<S> {
    pub fn new(store: S, source_version: u32, target_version: u32) -> Self {
        Self {
            store,
            source_version,
            target_version,
        }
    }

    pub async fn search(
        &self,
        collection: &str,
        query: &[f32],
        tenant_id: &str,
        k: usize,
    ) -> Result<Vec<VectorHit>, StoreError> {
        let target = self
            .store
            .search(
                collection,
                query,
                &VectorFilter {
                    tenant_id: tenant_id.to_string(),
                    embedding_version: Some(self.target_version),
                },
                k,
            )
            .await?;
        let source = self
            .store
            .search(
                collection,
                query,
                &VectorFilter {
                    tenant_id: tenant_id.to_string(),
                    embedding_version: Some(self.source_version),
                },
                k,
            )
            .await?;

        let mut merged: HashMap<String, VectorHit> = HashMap::new();
        for hit in source {
            merged.insert(hit.point.doc_id.clone(), hit);
        }
        // Target version wins on doc_id collision
        for hit in target {
            merged.insert(hit.point.doc_id.clone(), hit);
        }
        let mut hits: Vec<VectorHit> = merged.into_values().collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    /// Re-embed every source-version point into the target version using the
    /// caller-provided embedder. Idempotent: points already present at the
    /// target version are skipped, so a re-run over the same data is a no-op.
    pub async fn migrate<F>(
        &self,
        collection: &str,
        tenant_id: &str,
        target: EmbeddingVersion,
        mut embed: F,
    ) -> Result<usize, StoreError>
    where
        F: FnMut(&VectorPoint) -> Vec<f32>,
    {
        let points = self.store.scroll(collection, tenant_id).await?;
        let already_migrated: std::collections::HashSet<String> = points
            .iter()
            .filter(|p| p.version.embedding_version == self.target_version)
            .map(|p| p.doc_id.clone())
            .collect();

        let mut migrated = 0;
        for p in points
            .iter()
            .filter(|p| p.version.embedding_version == self.source_version)
            .filter(|p| !already_migrated.contains(&p.doc_id))
        {
            let new_point = VectorPoint {
                doc_id: p.doc_id.clone(),
                tenant_id: p.tenant_id.clone(),
                embedding: embed(p),
                version: target.clone(),
                payload: p.payload.clone(),
            };
            self.store.upsert(collection, vec![new_point]).await?;
            migrated += 1;
        }
        Ok(migrated)
    }
}
