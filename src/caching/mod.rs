//! # Caching System Module
//!
//! Response caching for upstream payloads.
//!
//! ## Features
//! - In-memory store with per-entry TTL and a capacity bound
//! - Deterministic cache keys from a route name and its request parameters
//! - Admin endpoints for cache statistics and clearing
//!
//! ## Architecture
//! 1. **Cache Stores**: the [`CacheStore`] contract and [`InMemoryCache`]
//! 2. **Key Generator**: [`CacheKey`] construction and normalisation
//! 3. **Admin Interface**: stats and clear endpoints
//!
//! ## Usage Example
//! ```rust,no_run
//! # async fn demo() {
//! use news_gateway::caching::{CacheKey, CacheStore, InMemoryCache, InMemoryCacheConfig};
//! use std::time::Duration;
//!
//! let cache = InMemoryCache::new(InMemoryCacheConfig::default());
//! let key = CacheKey::builder("search").param("q", Some("monsoon")).build();
//!
//! cache.set(key.as_str(), serde_json::json!({"articles": []}), Duration::from_secs(300)).await;
//! assert!(cache.get(key.as_str()).await.is_some());
//! # }
//! ```

pub mod admin;
pub mod key_generator;
pub mod stores;

pub use admin::{CacheAdminRouter, CacheAdminState};
pub use key_generator::{CacheKey, CacheKeyBuilder};
pub use stores::{
    spawn_cleanup_task, CacheEntry, CacheStore, CacheStoreStats, InMemoryCache, InMemoryCacheConfig,
};
