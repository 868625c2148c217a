//! # Cache Stores Module
//!
//! The [`CacheStore`] contract and its in-memory implementation.
//!
//! A store maps keys to upstream payloads with a per-entry expiry. A read at
//! or after `expires_at` behaves exactly like a miss, whether or not the entry
//! has been physically removed yet.

pub mod memory;

pub use memory::{InMemoryCache, InMemoryCacheConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

/// Cache entry with expiry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached payload
    pub value: Value,

    /// First instant at which the entry reads as absent
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Create a new cache entry stored at `now`
    pub fn new(value: Value, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now + ttl,
        }
    }

    /// Check whether the entry has expired at `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Trait for cache store implementations
///
/// A miss is not an error, so none of the operations can fail.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a live value from the cache
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key` for `ttl`, replacing any previous entry
    async fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Delete a value from the cache, returning whether a live entry was removed
    async fn delete(&self, key: &str) -> bool;

    /// Clear all entries from the cache
    async fn clear(&self);

    /// Physically remove expired entries, returning how many were dropped
    async fn purge_expired(&self) -> usize;

    /// Get cache statistics
    async fn stats(&self) -> CacheStoreStats;
}

/// Cache store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStoreStats {
    /// Number of stored entries, including expired ones not yet purged
    pub entries: usize,

    pub hits: u64,

    pub misses: u64,

    /// Live entries dropped to respect the capacity bound
    pub evictions: u64,

    /// Expired entries removed, lazily or by the purge task
    pub expired_cleanups: u64,
}

/// Spawn the background task that periodically purges expired entries.
pub fn spawn_cleanup_task(store: Arc<dyn CacheStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.purge_expired().await;
            if removed > 0 {
                debug!(removed, "Purged expired cache entries");
            }
        }
    })
}
