//! Object store seam for evidence artifacts and retention exports.
//!
//! Production binds to an S3-compatible store with SSE-KMS; tests use the
//! in-memory implementation. Content hashing happens in the audit service so
//! the hash covers exactly the bytes handed to this seam.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::StoreError;

/// A stored object's location and metadata.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub uri: String,
    pub size_bytes: usize,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` at `key` with server-side encryption.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<StoredObject, StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Keys under a prefix, lexicographically ordered.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory object store (tests, single-node runs).
#[derive(Default, Clone)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::default(),
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<StoredObject, StoreError> {
        let size = bytes.len();
        self.objects.lock().insert(key.to_string(), bytes);
        Ok(StoredObject {
            uri: format!("s3://{}/{}", self.bucket, key),
            size_bytes: size,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.lock().remove(key);
        Ok(())
    }
}
