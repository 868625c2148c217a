//! Traffic management: per-upstream call quotas.

pub mod rate_limiter;

pub use rate_limiter::{
    RateDecision, RateLimiter, RateLimitMetricsSnapshot, RateWindow, RateWindowSnapshot,
    UpstreamIdentity,
};
