//! In-process cache with per-entry TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::CacheStore;
use crate::error::Result;

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// Map-backed [`CacheStore`] with lazy expiry.
///
/// Expired entries are dropped when read; callers that hold large caches for a
/// long time can reclaim memory eagerly with [`MemoryCache::purge_expired`].
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl MemoryCache {
    /// Create a cache whose entries default to `default_ttl` when `set` is
    /// called without an explicit TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Number of entries, including not-yet-collected expired ones.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.value.clone()))
                }
                Some(_) => {}
            }
        }
        // Entry exists but has expired: upgrade to a write lock and drop it.
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn flush(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryCache::default();
        cache.set("k", &json!({"v": 1}), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = MemoryCache::default();
        assert!(cache.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped_on_read() {
        let cache = MemoryCache::default();
        cache
            .set("k", &json!("v"), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.len().await, 0, "expired entry should be collected");
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::default();
        cache.set("k", &json!("v"), None).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush() {
        let cache = MemoryCache::default();
        cache.set("a", &json!(1), None).await.unwrap();
        cache.set("b", &json!(2), None).await.unwrap();
        cache.flush().await.unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired_only_removes_stale() {
        let cache = MemoryCache::default();
        cache
            .set("stale", &json!(1), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        cache
            .set("fresh", &json!(2), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("fresh").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_set_overwrites_value_and_ttl() {
        let cache = MemoryCache::default();
        cache
            .set("k", &json!("old"), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        cache
            .set("k", &json!("new"), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("new")));
    }
}
