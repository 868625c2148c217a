//! # Admission Controller
//!
//! Decides, for one logical request, whether it is served from cache, sent to
//! the upstream, or rejected because the upstream's quota is used up.
//!
//! 1. Cache hit: return the cached payload. The limiter is not touched.
//! 2. Miss: ask the limiter. `Throttled` becomes [`AdmissionError::RateLimited`]
//!    and the cache is left alone.
//! 3. Admitted: run the fetch under a timeout. Success is cached for `ttl` and
//!    returned; failure becomes [`AdmissionError::Upstream`]. Failures are never
//!    cached and the quota they consumed is not given back.
//!
//! There are no internal retries.
//!
//! ## Miss coalescing
//! With coalescing enabled (the default) concurrent misses on the same key
//! queue on a per-key async lock and re-check the cache once they hold it, so
//! a burst of identical requests costs one upstream call and one unit of
//! quota. When the leading fetch fails the next waiter goes through the normal
//! limiter and fetch path itself. With coalescing disabled every concurrent
//! miss reaches the limiter and, if admitted, the upstream.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::caching::{CacheKey, CacheStore};
use crate::observability::metrics as gateway_metrics;
use crate::traffic::{RateDecision, RateLimiter, UpstreamIdentity};
use crate::upstream::UpstreamError;

/// Where a resolved payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Upstream,
}

impl Source {
    /// Value for the `x-cache` response header
    pub fn cache_status(&self) -> &'static str {
        match self {
            Self::Cache => "HIT",
            Self::Upstream => "MISS",
        }
    }
}

/// A successfully answered request
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub source: Source,
    pub value: Value,
}

/// Why a request could not be answered
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Rate limit exceeded for {identity}, retry after {retry_after_secs}s")]
    RateLimited {
        identity: UpstreamIdentity,
        retry_after_secs: u64,
    },

    #[error("Upstream {identity} failed: {source}")]
    Upstream {
        identity: UpstreamIdentity,
        #[source]
        source: UpstreamError,
    },
}

/// Admission settings
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Default timeout for a fetch
    pub fetch_timeout: Duration,

    /// Serialize concurrent misses for the same key
    pub coalesce_misses: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            coalesce_misses: true,
        }
    }
}

/// Composes the cache, the limiter and an upstream fetch
pub struct AdmissionController {
    cache: Arc<dyn CacheStore>,
    limiter: Arc<RateLimiter>,
    config: AdmissionConfig,
    in_flight: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AdmissionController {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        limiter: Arc<RateLimiter>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            cache,
            limiter,
            config,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Answer one request using the default fetch timeout
    pub async fn resolve<F, Fut>(
        &self,
        key: &CacheKey,
        identity: &UpstreamIdentity,
        ttl: Duration,
        fetch: F,
    ) -> Result<Resolved, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, UpstreamError>>,
    {
        self.resolve_within(key, identity, ttl, self.config.fetch_timeout, fetch)
            .await
    }

    /// Answer one request, giving the fetch at most `timeout`
    pub async fn resolve_within<F, Fut>(
        &self,
        key: &CacheKey,
        identity: &UpstreamIdentity,
        ttl: Duration,
        timeout: Duration,
        fetch: F,
    ) -> Result<Resolved, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, UpstreamError>>,
    {
        if let Some(value) = self.lookup(key).await {
            return Ok(Resolved {
                source: Source::Cache,
                value,
            });
        }

        let _slot = if self.config.coalesce_misses {
            let slot = InFlightSlot::acquire(&self.in_flight, key.as_str()).await;
            // Another caller may have filled the cache while we waited.
            if let Some(value) = self.lookup(key).await {
                return Ok(Resolved {
                    source: Source::Cache,
                    value,
                });
            }
            Some(slot)
        } else {
            None
        };

        gateway_metrics::record_cache_miss();

        match self.limiter.try_acquire(identity) {
            RateDecision::Allowed { count, remaining } => {
                debug!(identity = %identity, count, remaining, "Upstream call admitted");
            }
            throttled @ RateDecision::Throttled { .. } => {
                let retry_after_secs = throttled.retry_after_secs();
                warn!(
                    identity = %identity,
                    key = %key,
                    retry_after_secs,
                    "Upstream call throttled"
                );
                gateway_metrics::record_rate_limited(identity);
                return Err(AdmissionError::RateLimited {
                    identity: identity.clone(),
                    retry_after_secs,
                });
            }
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, fetch()).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(value) => {
                self.cache.set(key.as_str(), value.clone(), ttl).await;
                gateway_metrics::record_upstream(identity, "success", elapsed);
                info!(
                    identity = %identity,
                    key = %key,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Fetched from upstream"
                );
                Ok(Resolved {
                    source: Source::Upstream,
                    value,
                })
            }
            Err(source) => {
                gateway_metrics::record_upstream(identity, "failure", elapsed);
                warn!(identity = %identity, key = %key, error = %source, "Upstream fetch failed");
                Err(AdmissionError::Upstream {
                    identity: identity.clone(),
                    source,
                })
            }
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Value> {
        let value = self.cache.get(key.as_str()).await?;
        debug!(key = %key, "Cache hit");
        gateway_metrics::record_cache_hit();
        Some(value)
    }

    /// Number of keys with a fetch in progress or queued
    pub fn in_flight_keys(&self) -> usize {
        self.in_flight.len()
    }
}

/// Holds a key's in-flight lock and removes the map entry once nobody else wants it
struct InFlightSlot {
    guard: Option<OwnedMutexGuard<()>>,
    map: Arc<DashMap<String, Arc<Mutex<()>>>>,
    key: String,
}

impl InFlightSlot {
    async fn acquire(map: &Arc<DashMap<String, Arc<Mutex<()>>>>, key: &str) -> Self {
        let lock = map.entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        Self {
            guard: Some(guard),
            map: map.clone(),
            key: key.to_string(),
        }
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        // Release first so our own reference no longer counts.
        self.guard.take();
        self.map
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
