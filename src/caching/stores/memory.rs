//! # In-Memory Cache Store
//!
//! `DashMap`-backed cache with TTL expiry, lazy removal on read, and a
//! capacity bound that evicts the entry closest to expiry.

use super::{CacheEntry, CacheStore, CacheStoreStats};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// In-memory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    config: InMemoryCacheConfig,

    entries: DashMap<String, CacheEntry>,

    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_cleanups: AtomicU64,
}

impl InMemoryCache {
    /// Create a new in-memory cache
    pub fn new(config: InMemoryCacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_cleanups: AtomicU64::new(0),
        }
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.expired_cleanups
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Free one slot: expired entries go first, then the live entry closest to expiry.
    fn make_room(&self, now: Instant) {
        if self.purge_expired_at(now) > 0 {
            return;
        }

        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Evicted cache entry to respect capacity");
            }
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();

        match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => {}
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        // Only drop the entry if it is still the expired one. A concurrent set
        // may have replaced it.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .is_some()
        {
            self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let now = Instant::now();

        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_entries {
            self.make_room(now);
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(value, now, ttl));
    }

    async fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some((_, entry)) => !entry.is_expired_at(now),
            None => false,
        }
    }

    async fn clear(&self) {
        let entry_count = self.entries.len();
        self.entries.clear();
        info!("Cleared {} entries from in-memory cache", entry_count);
    }

    async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    async fn stats(&self) -> CacheStoreStats {
        CacheStoreStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::advance;

    fn cache() -> InMemoryCache {
        InMemoryCache::new(InMemoryCacheConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_before_ttl() {
        let cache = cache();
        let ttl = Duration::from_secs(60);

        cache.set("news?language=english", json!({"articles": [1, 2]}), ttl).await;
        advance(Duration::from_secs(59)).await;

        assert_eq!(
            cache.get("news?language=english").await,
            Some(json!({"articles": [1, 2]}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiration() {
        let cache = cache();
        cache.set("expire", json!("value"), Duration::from_secs(60)).await;

        advance(Duration::from_secs(60)).await;

        assert_eq!(cache.get("expire").await, None);
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.expired_cleanups, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiry() {
        let cache = cache();
        cache.set("k", json!(1), Duration::from_secs(10)).await;
        advance(Duration::from_secs(8)).await;
        cache.set("k", json!(2), Duration::from_secs(10)).await;
        advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("k").await, Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_keeps_live_entries() {
        let cache = cache();
        cache.set("short", json!(1), Duration::from_secs(5)).await;
        cache.set("long", json!(2), Duration::from_secs(500)).await;

        advance(Duration::from_secs(10)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.get("long").await, Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_closest_to_expiry() {
        let cache = InMemoryCache::new(InMemoryCacheConfig { max_entries: 3 });
        for i in 0..3 {
            cache
                .set(&format!("key_{}", i), json!(i), Duration::from_secs(60))
                .await;
            advance(Duration::from_secs(1)).await;
        }

        cache.set("key_3", json!(3), Duration::from_secs(60)).await;

        assert_eq!(cache.get("key_0").await, None);
        assert!(cache.get("key_1").await.is_some());
        assert!(cache.get("key_3").await.is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_prefers_expired_entries() {
        let cache = InMemoryCache::new(InMemoryCacheConfig { max_entries: 2 });
        cache.set("stale", json!(0), Duration::from_secs(1)).await;
        cache.set("fresh", json!(1), Duration::from_secs(60)).await;
        advance(Duration::from_secs(2)).await;

        cache.set("new", json!(2), Duration::from_secs(60)).await;

        assert!(cache.get("fresh").await.is_some());
        assert!(cache.get("new").await.is_some());
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn test_stats_and_delete() {
        let cache = cache();
        cache.set("key1", json!("v"), Duration::from_secs(60)).await;
        cache.get("key1").await;
        cache.get("key2").await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);

        assert!(cache.delete("key1").await);
        assert!(!cache.delete("key1").await);
        cache.clear().await;
        assert!(cache.is_empty());
    }
}
