// Structured logging
pub mod logging;

// Prometheus metrics for cache, quota and upstream activity
pub mod metrics;

pub use logging::init_logging;
pub use metrics::install_prometheus_recorder;
