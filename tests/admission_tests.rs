//! # Admission Integration Tests
//!
//! End-to-end scenarios through the cache, the limiter and the admission
//! controller with a counting fake upstream. Time is paused so TTL and window
//! boundaries can be crossed exactly.

use news_gateway::caching::{CacheKey, CacheStore, InMemoryCache, InMemoryCacheConfig};
use news_gateway::core::config::RateLimitConfig;
use news_gateway::gateway::{AdmissionConfig, AdmissionController, AdmissionError, Source};
use news_gateway::traffic::{RateLimiter, UpstreamIdentity};
use news_gateway::upstream::UpstreamError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(12 * 60 * 60);
const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Upstream stand-in that counts calls and can be told to fail
#[derive(Default)]
struct FakeUpstream {
    calls: AtomicUsize,
}

impl FakeUpstream {
    async fn fetch(&self, label: &str) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "articles": [{ "title": label }] }))
    }

    async fn fail(&self) -> Result<Value, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(UpstreamError::Status { status: 503 })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn create_controller() -> AdmissionController {
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()));
    let limiter = Arc::new(RateLimiter::new(
        RateLimitConfig {
            requests_per_window: 30,
            window_duration: WINDOW,
            ..Default::default()
        },
        ["search", "telugu", "english"].map(UpstreamIdentity::new),
    ));
    AdmissionController::new(cache, limiter, AdmissionConfig::default())
}

fn search_key(q: &str) -> CacheKey {
    CacheKey::builder("search").param("q", Some(q)).build()
}

fn calls_made(controller: &AdmissionController, identity: &str) -> u32 {
    controller
        .limiter()
        .snapshot()
        .into_iter()
        .find(|s| s.identity.as_str() == identity)
        .map(|s| s.calls_made)
        .unwrap_or_default()
}

#[tokio::test(start_paused = true)]
async fn test_thirty_first_distinct_call_is_rate_limited() {
    let controller = create_controller();
    let upstream = FakeUpstream::default();
    let search = UpstreamIdentity::new("search");

    for i in 0..30 {
        let q = format!("topic-{}", i);
        let resolved = controller
            .resolve(&search_key(&q), &search, TTL, || upstream.fetch(&q))
            .await
            .unwrap();
        assert_eq!(resolved.source, Source::Upstream);
    }
    assert_eq!(controller.cache().stats().await.entries, 30);

    let err = controller
        .resolve(&search_key("topic-30"), &search, TTL, || upstream.fetch("topic-30"))
        .await
        .unwrap_err();

    match err {
        AdmissionError::RateLimited {
            identity,
            retry_after_secs,
        } => {
            assert_eq!(identity, search);
            assert!(retry_after_secs > 0);
            assert!(retry_after_secs <= WINDOW.as_secs());
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
    assert_eq!(upstream.calls(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_same_key_twice_fetches_once() {
    let controller = create_controller();
    let upstream = FakeUpstream::default();
    let search = UpstreamIdentity::new("search");
    let key = search_key("elections");

    let first = controller
        .resolve(&key, &search, TTL, || upstream.fetch("elections"))
        .await
        .unwrap();
    let second = controller
        .resolve(&key, &search, TTL, || upstream.fetch("elections"))
        .await
        .unwrap();

    assert_eq!(first.source, Source::Upstream);
    assert_eq!(second.source, Source::Cache);
    assert_eq!(first.value, second.value);
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_does_not_consume_quota() {
    let controller = create_controller();
    let upstream = FakeUpstream::default();
    let search = UpstreamIdentity::new("search");
    let key = search_key("budget");

    controller
        .resolve(&key, &search, TTL, || upstream.fetch("budget"))
        .await
        .unwrap();

    for _ in 0..100 {
        controller
            .resolve(&key, &search, TTL, || upstream.fetch("budget"))
            .await
            .unwrap();
    }

    assert_eq!(calls_made(&controller, "search"), 1);
    assert_eq!(calls_made(&controller, "telugu"), 0);
    assert_eq!(calls_made(&controller, "english"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_is_not_cached_but_is_counted() {
    let controller = create_controller();
    let upstream = FakeUpstream::default();
    let search = UpstreamIdentity::new("search");
    let key = search_key("flaky");

    let err = controller
        .resolve(&key, &search, TTL, || upstream.fail())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AdmissionError::Upstream {
            source: UpstreamError::Status { status: 503 },
            ..
        }
    ));
    assert_eq!(calls_made(&controller, "search"), 1);

    let retried = controller
        .resolve(&key, &search, TTL, || upstream.fetch("flaky"))
        .await
        .unwrap();
    assert_eq!(retried.source, Source::Upstream);
    assert_eq!(calls_made(&controller, "search"), 2);
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_still_subject_to_limit() {
    let controller = create_controller();
    let upstream = FakeUpstream::default();
    let search = UpstreamIdentity::new("search");

    for i in 0..29 {
        let q = format!("warmup-{}", i);
        controller
            .resolve(&search_key(&q), &search, TTL, || upstream.fetch(&q))
            .await
            .unwrap();
    }

    let key = search_key("flaky");
    controller
        .resolve(&key, &search, TTL, || upstream.fail())
        .await
        .unwrap_err();

    let err = controller
        .resolve(&key, &search, TTL, || upstream.fetch("flaky"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::RateLimited { .. }));
    assert_eq!(upstream.calls(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_entry_expires_after_ttl() {
    let controller = create_controller();
    let upstream = FakeUpstream::default();
    let search = UpstreamIdentity::new("search");
    let key = search_key("weather");
    let ttl = Duration::from_secs(60);

    controller
        .resolve(&key, &search, ttl, || upstream.fetch("weather"))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(59)).await;
    let fresh = controller
        .resolve(&key, &search, ttl, || upstream.fetch("weather"))
        .await
        .unwrap();
    assert_eq!(fresh.source, Source::Cache);

    tokio::time::advance(Duration::from_secs(1)).await;
    let refetched = controller
        .resolve(&key, &search, ttl, || upstream.fetch("weather"))
        .await
        .unwrap();
    assert_eq!(refetched.source, Source::Upstream);
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_window_reset_admits_again() {
    let controller = create_controller();
    let upstream = FakeUpstream::default();
    let search = UpstreamIdentity::new("search");

    for i in 0..30 {
        let q = format!("q-{}", i);
        controller
            .resolve(&search_key(&q), &search, TTL, || upstream.fetch(&q))
            .await
            .unwrap();
    }
    assert!(controller
        .resolve(&search_key("late"), &search, TTL, || upstream.fetch("late"))
        .await
        .is_err());

    tokio::time::advance(WINDOW).await;

    let resolved = controller
        .resolve(&search_key("late"), &search, TTL, || upstream.fetch("late"))
        .await
        .unwrap();
    assert_eq!(resolved.source, Source::Upstream);
    assert_eq!(calls_made(&controller, "search"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_identities_have_independent_quotas() {
    let controller = create_controller();
    let upstream = FakeUpstream::default();
    let telugu = UpstreamIdentity::new("telugu");
    let english = UpstreamIdentity::new("english");

    for page in 0..30u32 {
        let key = CacheKey::builder("news")
            .param("language", Some("te"))
            .param_num("page", Some(page))
            .build();
        controller
            .resolve(&key, &telugu, TTL, || upstream.fetch("te"))
            .await
            .unwrap();
    }

    let key = CacheKey::builder("news").param("language", Some("en")).build();
    let resolved = controller
        .resolve(&key, &english, TTL, || upstream.fetch("en"))
        .await
        .unwrap();
    assert_eq!(resolved.source, Source::Upstream);
}
