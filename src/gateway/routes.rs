//! # HTTP Routes
//!
//! Every content route follows the same shape: validate input, build the
//! cache key, pick the identity, hand an upstream fetch to the
//! [`AdmissionController`], and render the outcome. Errors are rendered by
//! [`GatewayError`]'s `IntoResponse`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::{Host, Url};

use super::admission::{AdmissionController, Resolved};
use crate::caching::{CacheAdminRouter, CacheAdminState, CacheKey};
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::upstream::{NewsQuery, Upstreams};

/// Response header reporting whether the payload came from cache
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Language used by the rewrite route when the body names none
const DEFAULT_REWRITE_LANGUAGE: &str = "english";

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub admission: Arc<AdmissionController>,
    pub upstreams: Arc<Upstreams>,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the public router
pub fn create_router(state: AppState) -> Router {
    let cache_admin = CacheAdminRouter::create_router(CacheAdminState {
        cache: state.admission.cache().clone(),
    });

    let mut router = Router::new()
        .route("/api/news/:language", get(news_by_language))
        .route("/api/search", get(search))
        .route("/api/rewrite", post(rewrite))
        .route("/api/rate-limit", get(rate_limit_status))
        .route("/health", get(health_check));

    if state.config.observability.metrics.enabled {
        router = router.route(
            &state.config.observability.metrics.endpoint_path,
            get(render_metrics),
        );
    }

    router.with_state(state).nest("/api", cache_admin)
}

#[derive(Debug, Deserialize)]
pub struct NewsParams {
    pub category: Option<String>,
    /// Opaque `next_page` token from a previous listing
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RewriteRequest {
    pub url: Option<String>,
    pub language: Option<String>,
}

/// Latest headlines for one configured language
#[instrument(skip_all, fields(language = %language))]
async fn news_by_language(
    State(state): State<AppState>,
    Path(language): Path<String>,
    params: Result<Query<NewsParams>, QueryRejection>,
) -> GatewayResult<Response> {
    let Query(params) = params.map_err(query_rejection)?;
    let language = language.trim().to_lowercase();
    let route = state.config.routes.languages.get(&language).ok_or_else(|| {
        GatewayError::validation("language", format!("unsupported language '{}'", language))
    })?;

    let key = CacheKey::builder("news")
        .param_folded("language", Some(route.code.as_str()))
        .param_folded("category", params.category.as_deref())
        .param("page", params.page.as_deref())
        .build();

    let upstreams = state.upstreams.clone();
    let query = NewsQuery {
        query: None,
        language: Some(route.code.as_str()),
        category: params.category.as_deref().map(str::trim),
        page: params.page.as_deref().map(str::trim),
    };

    let resolved = state
        .admission
        .resolve_within(
            &key,
            &route.identity,
            state.config.cache.default_ttl,
            state.config.upstreams.news.timeout,
            || async move { upstreams.news.latest(&query).await },
        )
        .await?;

    Ok(render(resolved))
}

/// Free-text search
#[instrument(skip_all)]
async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> GatewayResult<Response> {
    let Query(params) = params.map_err(query_rejection)?;
    let q = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| GatewayError::validation("q", "query text is required"))?;

    // A configured language name maps to its upstream code, so both
    // spellings share a cache entry.
    let language = params.language.as_deref().map(|raw| {
        let folded = raw.trim().to_lowercase();
        match state.config.routes.languages.get(&folded) {
            Some(route) => route.code.clone(),
            None => folded,
        }
    });

    let key = CacheKey::builder("search")
        .param("q", Some(q))
        .param_folded("language", language.as_deref())
        .param_folded("category", params.category.as_deref())
        .param("page", params.page.as_deref())
        .build();

    let upstreams = state.upstreams.clone();
    let query = NewsQuery {
        query: Some(q),
        language: language.as_deref(),
        category: params.category.as_deref().map(str::trim),
        page: params.page.as_deref().map(str::trim),
    };

    let resolved = state
        .admission
        .resolve_within(
            &key,
            &state.config.routes.search_identity,
            state.config.cache.default_ttl,
            state.config.upstreams.news.timeout,
            || async move { upstreams.news.search(&query).await },
        )
        .await?;

    Ok(render(resolved))
}

/// Scrape an article and rewrite its text
#[instrument(skip_all)]
async fn rewrite(
    State(state): State<AppState>,
    request: Result<Json<RewriteRequest>, JsonRejection>,
) -> GatewayResult<Response> {
    let Json(request) =
        request.map_err(|rejection| GatewayError::validation("body", rejection.body_text()))?;
    let raw_url = request
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| GatewayError::validation("url", "url is required"))?;

    let url = Url::parse(raw_url)
        .map_err(|e| GatewayError::validation("url", format!("invalid url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(GatewayError::validation(
            "url",
            "only http and https urls are supported",
        ));
    }
    if !state.config.routes.rewrite_allow_private_hosts && is_private_host(&url) {
        warn!(host = ?url.host_str(), "Rejected rewrite of a private address");
        return Err(GatewayError::validation(
            "url",
            "urls pointing at local or private addresses are not allowed",
        ));
    }

    let language = request
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_REWRITE_LANGUAGE)
        .to_lowercase();

    let key = CacheKey::builder("rewrite")
        .param("url", Some(url.as_str()))
        .param_folded("language", Some(language.as_str()))
        .build();

    let upstreams = state.upstreams.clone();
    let upstream_config = &state.config.upstreams;
    let timeout = upstream_config.scrape.timeout + upstream_config.rewrite.timeout;

    let resolved = state
        .admission
        .resolve_within(
            &key,
            &state.config.routes.rewrite_identity,
            state.config.cache.default_ttl,
            timeout,
            || async move { upstreams.scrape_and_rewrite(&url, &language).await },
        )
        .await?;

    Ok(render(resolved))
}

/// Quota usage for every identity. Does not consume quota.
async fn rate_limit_status(State(state): State<AppState>) -> Json<Value> {
    let limiter = state.admission.limiter();
    Json(json!({
        "limits": limiter.snapshot(),
        "totals": limiter.get_metrics(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Health check handler
pub async fn health_check() -> impl IntoResponse {
    let health_info = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    });

    (StatusCode::OK, Json(health_info))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

fn render(resolved: Resolved) -> Response {
    debug!(source = ?resolved.source, "Request resolved");
    let mut response = Json(resolved.value).into_response();
    response.headers_mut().insert(
        X_CACHE,
        HeaderValue::from_static(resolved.source.cache_status()),
    );
    response
}

fn query_rejection(rejection: QueryRejection) -> GatewayError {
    GatewayError::validation("query", rejection.body_text())
}

/// Whether `url` names this machine or a non-routable network
fn is_private_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_private_ipv4(ip),
        Some(Host::Ipv6(ip)) => is_private_ipv6(ip),
        None => true,
    }
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && ip.octets()[1] & 0xc0 == 64)
}

fn is_private_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_ipv4(mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || first & 0xfe00 == 0xfc00
        // fe80::/10 link local
        || first & 0xffc0 == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private(raw: &str) -> bool {
        is_private_host(&Url::parse(raw).unwrap())
    }

    #[test]
    fn test_local_and_private_hosts_are_detected() {
        for raw in [
            "http://localhost/a",
            "http://LOCALHOST:8080/a",
            "http://api.localhost/a",
            "http://127.0.0.1/a",
            "http://127.8.9.10/a",
            "http://10.1.2.3/a",
            "http://172.16.0.1/a",
            "http://192.168.1.20/a",
            "http://169.254.169.254/latest/meta-data",
            "http://0.0.0.0/a",
            "http://100.64.0.1/a",
            "http://[::1]/a",
            "http://[::]/a",
            "http://[fd00::1]/a",
            "http://[fe80::1]/a",
            "http://[::ffff:127.0.0.1]/a",
        ] {
            assert!(private(raw), "{} should be private", raw);
        }
    }

    #[test]
    fn test_public_hosts_are_allowed() {
        for raw in [
            "https://www.thehindu.com/news/article1.ece",
            "http://93.184.216.34/a",
            "http://172.32.0.1/a",
            "http://[2606:4700::1111]/a",
        ] {
            assert!(!private(raw), "{} should be public", raw);
        }
    }

    #[test]
    fn test_numeric_hosts_are_normalized_before_checking() {
        // Decimal and short forms parse to 127.0.0.1.
        assert!(private("http://2130706433/a"));
        assert!(private("http://127.1/a"));
    }
}
