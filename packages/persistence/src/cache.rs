//! TTL cache seam.
//!
//! Every read and write is fail-open: a dead cache is a miss, not an error.
//! Key construction is centralized here so the tenancy invariant (no cached
//! key crosses tenants) has a single enforcement point.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cache key builders. IOC keys are tenant-scoped; FP patterns and kill
/// switches are platform-global.
pub mod keys {
    /// `ioc:{tenant}:{type}:{value}`
    pub fn ioc(tenant_id: &str, ioc_type: &str, value: &str) -> String {
        format!("ioc:{tenant_id}:{ioc_type}:{value}")
    }

    /// `fp:{pattern_id}`
    pub fn fp_pattern(pattern_id: &str) -> String {
        format!("fp:{pattern_id}")
    }

    /// `kill_switch:{dimension}:{value}`
    pub fn kill_switch(dimension: &str, value: &str) -> String {
        format!("kill_switch:{dimension}:{value}")
    }
}

/// Fail-open async cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `None` on miss or on any cache failure.
    async fn get(&self, key: &str) -> Option<String>;

    /// Best-effort write; failures are logged and swallowed.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration);

    /// Best-effort delete.
    async fn delete(&self, key: &str);

    /// Keys matching a prefix. Empty on failure.
    async fn scan_prefix(&self, prefix: &str) -> Vec<String>;
}

/// Redis binding over a connection manager.
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs())
            .await
        {
            tracing::warn!(key = %key, error = %e, "cache write failed, continuing");
        }
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, ()>(key).await {
            tracing::warn!(key = %key, error = %e, "cache delete failed, continuing");
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Vec<String> {
        let mut conn = self.conn.clone();
        match conn.keys::<_, Vec<String>>(format!("{prefix}*")).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "cache scan failed, returning empty");
                Vec::new()
            }
        }
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory cache with real TTL expiry, used by tests.
#[derive(Default, Clone)]
pub struct MemoryCache {
    inner: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        match inner.get(key) {
            Some(e) if e.expires_at > Instant::now() => Some(e.value.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        self.inner.lock().insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        self.inner.lock().remove(key);
    }

    async fn scan_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        self.inner
            .lock()
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioc_key_carries_tenant() {
        let key = keys::ioc("t1", "ip", "10.0.0.1");
        assert_eq!(key, "ioc:t1:ip:10.0.0.1");
        assert!(key.contains(":t1:"));
    }

    #[test]
    fn test_global_keys() {
        assert_eq!(keys::fp_pattern("fp-001"), "fp:fp-001");
        assert_eq!(keys::kill_switch("tenant", "t1"), "kill_switch:tenant:t1");
    }

    #[tokio::test]
    async fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("k", "v", Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        cache.delete("k").await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("k", "v", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("kill_switch:tenant:t1", "on", Duration::from_secs(60)).await;
        cache.set_with_ttl("kill_switch:pattern:p1", "on", Duration::from_secs(60)).await;
        cache.set_with_ttl("fp:fp-001", "{}", Duration::from_secs(60)).await;
        let hits = cache.scan_prefix("kill_switch:").await;
        assert_eq!(hits.len(), 2);
    }
}
