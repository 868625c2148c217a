//! # News Gateway Library
//!
//! A caching, rate-limited gateway in front of third-party news APIs and an
//! article scrape-and-rewrite pipeline.
//!
//! Every content route shares one admission path: serve from cache when a
//! fresh entry exists, otherwise charge the upstream's quota and fetch, or
//! reject with a retry hint when the quota for the current window is spent.
//!
//! ## Module Layout
//! - `core`: configuration and error types
//! - `caching`: cache stores, cache keys, cache admin endpoints
//! - `traffic`: fixed-window per-upstream rate limiting
//! - `upstream`: HTTP clients for the news, scrape and rewrite services
//! - `gateway`: admission controller, routes, server
//! - `observability`: logging and metrics

/// Configuration and error types
pub mod core;

/// Admission controller, HTTP routes, and the server
pub mod gateway;

/// Response caching
pub mod caching;

/// Per-upstream rate limiting
pub mod traffic;

/// Clients for third-party services
pub mod upstream;

/// Structured logging and Prometheus metrics
pub mod observability;

pub use core::config::GatewayConfig;
pub use core::error::{GatewayError, GatewayResult};
pub use gateway::server::GatewayServer;
