//! # Fixed-Window Rate Limiter
//!
//! Bounds the number of upstream calls per [`UpstreamIdentity`].
//!
//! Each identity owns one [`RateWindow`] `[window_start, window_start + W)`
//! that counts admitted calls. Once `now` reaches the end of the window the
//! count drops to zero and a fresh window `[now, now + W)` opens, no matter
//! how busy the previous one was. Bursts straddling a boundary are therefore
//! not smoothed; that is the documented behaviour.
//!
//! Windows live in a `DashMap`. The entry guard is held across the
//! reset-check-increment sequence, so concurrent callers on a multi-threaded
//! runtime can never admit more than the limit.
//!
//! ## Usage Example
//! ```rust,ignore
//! let limiter = RateLimiter::new(RateLimitConfig::default(), [UpstreamIdentity::new("search")]);
//! match limiter.try_acquire(&UpstreamIdentity::new("search")) {
//!     RateDecision::Allowed { remaining, .. } => { /* call upstream */ }
//!     RateDecision::Throttled { retry_after } => { /* answer 429 */ }
//! }
//! ```

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::core::config::{RateLimitConfig, RateLimitRule};

/// Name of an independent upstream quota (`telugu`, `english`, `search`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamIdentity(String);

impl UpstreamIdentity {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counter for one identity's current window
#[derive(Debug, Clone)]
pub struct RateWindow {
    pub identity: UpstreamIdentity,
    pub count: u32,
    pub window_start: Instant,
    pub window_end: Instant,
    rule: RateLimitRule,
}

impl RateWindow {
    fn open(identity: UpstreamIdentity, rule: RateLimitRule, now: Instant) -> Self {
        Self {
            identity,
            count: 0,
            window_start: now,
            window_end: now + rule.window_duration,
            rule,
        }
    }

    /// Start a fresh window if the current one has ended. Returns whether it rolled.
    fn roll(&mut self, now: Instant) -> bool {
        if now < self.window_end {
            return false;
        }
        self.count = 0;
        self.window_start = now;
        self.window_end = now + self.rule.window_duration;
        true
    }

    fn remaining(&self) -> u32 {
        self.rule.requests_per_window.saturating_sub(self.count)
    }
}

/// Outcome of [`RateLimiter::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The call was counted; `count` includes it
    Allowed { count: u32, remaining: u32 },
    /// The window is full until `retry_after` elapses
    Throttled { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Whole seconds to wait, rounded up; zero when allowed
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Allowed { .. } => 0,
            Self::Throttled { retry_after } => ceil_secs(*retry_after),
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Point-in-time view of one identity's window
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RateWindowSnapshot {
    pub identity: UpstreamIdentity,
    pub limit: u32,
    pub calls_made: u32,
    pub remaining: u32,
    pub window_seconds: u64,
    pub resets_in_seconds: u64,
}

/// Fixed-window limiter shared by every route
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<UpstreamIdentity, RateWindow>,
    metrics: RateLimitMetrics,
}

impl RateLimiter {
    /// Create a limiter with a window already open for each known identity
    pub fn new<I>(config: RateLimitConfig, identities: I) -> Self
    where
        I: IntoIterator<Item = UpstreamIdentity>,
    {
        let now = Instant::now();
        let windows = DashMap::new();
        for identity in identities {
            let rule = config.rule_for(&identity);
            windows.insert(identity.clone(), RateWindow::open(identity, rule, now));
        }

        Self {
            config,
            windows,
            metrics: RateLimitMetrics::default(),
        }
    }

    /// Count one upstream call against `identity` if its window has room.
    ///
    /// Only call this when a fetch will actually follow: an `Allowed` result
    /// has already consumed quota.
    pub fn try_acquire(&self, identity: &UpstreamIdentity) -> RateDecision {
        let now = Instant::now();
        let mut window = self.windows.entry(identity.clone()).or_insert_with(|| {
            RateWindow::open(identity.clone(), self.config.rule_for(identity), now)
        });

        if window.roll(now) {
            debug!(identity = %identity, "Rate limit window reset");
        }

        if window.count < window.rule.requests_per_window {
            window.count += 1;
            self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
            RateDecision::Allowed {
                count: window.count,
                remaining: window.remaining(),
            }
        } else {
            self.metrics.denied.fetch_add(1, Ordering::Relaxed);
            RateDecision::Throttled {
                retry_after: window.window_end.saturating_duration_since(now),
            }
        }
    }

    /// Current state of every known window, sorted by identity.
    ///
    /// Windows that have ended are reset first, so the view never reports a
    /// stale count.
    pub fn snapshot(&self) -> Vec<RateWindowSnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<RateWindowSnapshot> = self
            .windows
            .iter_mut()
            .map(|mut entry| {
                let window = entry.value_mut();
                window.roll(now);
                RateWindowSnapshot {
                    identity: window.identity.clone(),
                    limit: window.rule.requests_per_window,
                    calls_made: window.count,
                    remaining: window.remaining(),
                    window_seconds: window.rule.window_duration.as_secs(),
                    resets_in_seconds: ceil_secs(window.window_end.saturating_duration_since(now)),
                }
            })
            .collect();
        snapshots.sort_by(|a, b| a.identity.cmp(&b.identity));
        snapshots
    }

    pub fn get_metrics(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            requests_allowed: self.metrics.allowed.load(Ordering::Relaxed),
            requests_denied: self.metrics.denied.load(Ordering::Relaxed),
        }
    }
}

/// Rate limiting counters since startup
#[derive(Debug, Default)]
struct RateLimitMetrics {
    allowed: AtomicU64,
    denied: AtomicU64,
}

/// Snapshot of rate limiting metrics
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitMetricsSnapshot {
    pub requests_allowed: u64,
    pub requests_denied: u64,
}
