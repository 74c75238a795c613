//! Process-wide TTL cache for resolved identifiers and opt-in responses.
//!
//! Expiry is lazy: an entry past its TTL is removed by the read that finds
//! it. There is no background sweep, so memory is bounded only by key churn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

/// How an opt-in caching call site treats the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a live entry if present; otherwise fetch and store. (Default)
    #[default]
    Use,
    /// Always fetch, then store the fresh response.
    Refresh,
    /// Always fetch; never read or write the cache.
    Bypass,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

#[derive(Debug, Clone)]
pub struct TtlCache {
    inner: Arc<tokio::sync::RwLock<HashMap<String, CacheEntry>>>,
    default_ttl: Duration,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3_600))
    }
}

impl TtlCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            default_ttl,
        }
    }

    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns a live entry, removing it instead if its TTL has elapsed.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let store = self.inner.read().await;
            match store.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.data.clone()),
                Some(_) => {}
            }
        }

        let mut store = self.inner.write().await;
        // Re-check under the write lock: a writer may have refreshed the key.
        match store.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.data.clone()),
            Some(_) => {
                store.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` for `ttl`, or the cache default when `None`.
    pub async fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry {
            data: value,
            stored_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.inner.write().await.insert(key.into(), entry);
    }

    /// Entry count, including entries that have expired but not yet been read.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_returns_stored_value_until_overwritten() {
        let cache = TtlCache::new(Duration::from_secs(60));

        assert!(cache.get("id:123 main st|anytown").await.is_none());

        cache.set("id:123 main st|anytown", json!("1001"), None).await;
        assert_eq!(cache.get("id:123 main st|anytown").await, Some(json!("1001")));

        cache.set("id:123 main st|anytown", json!("1002"), None).await;
        assert_eq!(cache.get("id:123 main st|anytown").await, Some(json!("1002")));
    }

    #[tokio::test]
    async fn expired_entry_is_absent_and_removed_on_read() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache
            .set("geo:a", json!({"SB": "SB1"}), Some(Duration::from_millis(20)))
            .await;
        assert_eq!(cache.len().await, 1);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cache.get("geo:a").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn explicit_ttl_overrides_default() {
        let cache = TtlCache::new(Duration::from_millis(1));
        cache.set("k", json!(1), Some(Duration::from_secs(60))).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get("k").await, Some(json!(1)));
    }

    #[test]
    fn cache_mode_defaults_to_use() {
        assert_eq!(CacheMode::default(), CacheMode::Use);
    }
}
