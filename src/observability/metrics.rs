//! # Metrics
//!
//! Counters and histograms go through the `metrics` facade, so recording is a
//! no-op until a recorder is installed. The binary installs the Prometheus
//! recorder and serves its rendering on the metrics endpoint.
//!
//! | Name | Kind | Labels |
//! |------|------|--------|
//! | `gateway_cache_hits_total` | counter | |
//! | `gateway_cache_misses_total` | counter | |
//! | `gateway_rate_limited_total` | counter | `identity` |
//! | `gateway_upstream_requests_total` | counter | `identity`, `outcome` |
//! | `gateway_upstream_duration_seconds` | histogram | `identity` |

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};
use crate::traffic::UpstreamIdentity;

pub const CACHE_HITS: &str = "gateway_cache_hits_total";
pub const CACHE_MISSES: &str = "gateway_cache_misses_total";
pub const RATE_LIMITED: &str = "gateway_rate_limited_total";
pub const UPSTREAM_REQUESTS: &str = "gateway_upstream_requests_total";
pub const UPSTREAM_DURATION: &str = "gateway_upstream_duration_seconds";

/// Upstream latency buckets, in seconds
const UPSTREAM_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Install the global Prometheus recorder and return the handle used to render it
pub fn install_prometheus_recorder() -> GatewayResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(UPSTREAM_DURATION.to_string()), UPSTREAM_BUCKETS)
        .map_err(|e| GatewayError::internal(format!("Failed to set histogram buckets: {}", e)))?
        .install_recorder()
        .map_err(|e| GatewayError::internal(format!("Failed to install metrics recorder: {}", e)))
}

pub fn record_cache_hit() {
    metrics::counter!(CACHE_HITS).increment(1);
}

pub fn record_cache_miss() {
    metrics::counter!(CACHE_MISSES).increment(1);
}

pub fn record_rate_limited(identity: &UpstreamIdentity) {
    metrics::counter!(RATE_LIMITED, "identity" => identity.as_str().to_string()).increment(1);
}

/// Record one finished upstream call; `outcome` is `success` or `failure`
pub fn record_upstream(identity: &UpstreamIdentity, outcome: &'static str, elapsed: Duration) {
    let identity = identity.as_str().to_string();
    metrics::counter!(UPSTREAM_REQUESTS, "identity" => identity.clone(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!(UPSTREAM_DURATION, "identity" => identity).record(elapsed.as_secs_f64());
}
