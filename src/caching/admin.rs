//! # Cache Admin Interface
//!
//! Endpoints for cache monitoring and manual clearing.

use super::{CacheStore, CacheStoreStats};
use axum::{
    extract::State,
    response::Json,
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Cache admin state
#[derive(Clone)]
pub struct CacheAdminState {
    pub cache: Arc<dyn CacheStore>,
}

/// Cache admin router
pub struct CacheAdminRouter;

impl CacheAdminRouter {
    /// Create cache admin router
    pub fn create_router(state: CacheAdminState) -> Router {
        Router::new()
            .route("/cache/stats", get(get_cache_stats))
            .route("/cache", delete(clear_cache))
            .with_state(state)
    }
}

/// Cache statistics response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub stats: CacheStoreStats,
    pub hit_ratio: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Cache clear response
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheClearResponse {
    pub success: bool,
    pub cleared_entries: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Get cache statistics
pub async fn get_cache_stats(State(state): State<CacheAdminState>) -> Json<CacheStatsResponse> {
    let stats = state.cache.stats().await;
    let lookups = stats.hits + stats.misses;
    let hit_ratio = if lookups == 0 {
        0.0
    } else {
        stats.hits as f64 / lookups as f64
    };

    Json(CacheStatsResponse {
        stats,
        hit_ratio,
        timestamp: chrono::Utc::now(),
    })
}

/// Clear all cache entries
pub async fn clear_cache(State(state): State<CacheAdminState>) -> Json<CacheClearResponse> {
    let cleared_entries = state.cache.stats().await.entries;
    state.cache.clear().await;
    info!(cleared_entries, "Cache cleared via admin API");

    Json(CacheClearResponse {
        success: true,
        cleared_entries,
        timestamp: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{InMemoryCache, InMemoryCacheConfig};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use std::time::Duration;

    fn create_test_state() -> CacheAdminState {
        CacheAdminState {
            cache: Arc::new(InMemoryCache::new(InMemoryCacheConfig::default())),
        }
    }

    #[tokio::test]
    async fn test_cache_stats_endpoint() {
        let state = create_test_state();
        state.cache.set("k", json!(1), Duration::from_secs(60)).await;
        state.cache.get("k").await;
        state.cache.get("other").await;

        let server = TestServer::new(CacheAdminRouter::create_router(state)).unwrap();
        let response = server.get("/cache/stats").await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let stats: CacheStatsResponse = response.json();
        assert_eq!(stats.stats.entries, 1);
        assert_eq!(stats.stats.hits, 1);
        assert_eq!(stats.stats.misses, 1);
        assert!((stats.hit_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cache_clear_endpoint() {
        let state = create_test_state();
        state.cache.set("key1", json!("a"), Duration::from_secs(60)).await;
        state.cache.set("key2", json!("b"), Duration::from_secs(60)).await;

        let server = TestServer::new(CacheAdminRouter::create_router(state.clone())).unwrap();
        let response = server.delete("/cache").await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let cleared: CacheClearResponse = response.json();
        assert!(cleared.success);
        assert_eq!(cleared.cleared_entries, 2);
        assert!(state.cache.get("key1").await.is_none());
    }
}
