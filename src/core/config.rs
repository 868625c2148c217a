//! # Configuration Module
//!
//! Configuration structures and loading for the gateway.
//!
//! ## Key Features
//! - YAML configuration parsing with serde
//! - Human-readable durations (`12h`, `15m`, `10s`) via `humantime_serde`
//! - Environment variable override support (`GATEWAY_<SECTION>_<FIELD>`)
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};
use crate::traffic::UpstreamIdentity;

/// Main gateway configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener settings
    pub server: ServerConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Per-identity upstream call quotas
    pub rate_limit: RateLimitConfig,

    /// Upstream endpoints and credentials
    pub upstreams: UpstreamsConfig,

    /// Route to identity mapping
    pub routes: RoutesConfig,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise start from defaults.
    /// Environment overrides and validation apply either way.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        if tokio::fs::try_exists(path.as_ref()).await.unwrap_or(false) {
            return Self::load_from_file(path).await;
        }

        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without overrides or validation
    pub fn from_yaml(content: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("GATEWAY_"))
            .collect();
        self.apply_overrides(&vars)
    }

    /// Apply overrides from an explicit variable map.
    pub fn apply_overrides(&mut self, vars: &HashMap<String, String>) -> GatewayResult<()> {
        if let Some(addr) = vars.get("GATEWAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = addr.clone();
        }

        if let Some(port) = vars.get("GATEWAY_SERVER_HTTP_PORT") {
            self.server.http_port = port.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_SERVER_HTTP_PORT: {}", e))
            })?;
        }

        if let Some(ttl) = vars.get("GATEWAY_CACHE_TTL") {
            self.cache.default_ttl = parse_duration("GATEWAY_CACHE_TTL", ttl)?;
        }

        if let Some(limit) = vars.get("GATEWAY_RATE_LIMIT_REQUESTS") {
            self.rate_limit.requests_per_window = limit.parse().map_err(|e| {
                GatewayError::config(format!("Invalid GATEWAY_RATE_LIMIT_REQUESTS: {}", e))
            })?;
        }

        if let Some(window) = vars.get("GATEWAY_RATE_LIMIT_WINDOW") {
            self.rate_limit.window_duration = parse_duration("GATEWAY_RATE_LIMIT_WINDOW", window)?;
        }

        if let Some(timeout) = vars.get("GATEWAY_UPSTREAM_TIMEOUT") {
            let timeout = parse_duration("GATEWAY_UPSTREAM_TIMEOUT", timeout)?;
            self.upstreams.news.timeout = timeout;
            self.upstreams.scrape.timeout = timeout;
        }

        if let Some(key) = vars.get("GATEWAY_NEWS_API_KEY") {
            self.upstreams.news.api_key = Secret::new(key.clone());
        }

        if let Some(key) = vars.get("GATEWAY_REWRITE_API_KEY") {
            self.upstreams.rewrite.api_key = Secret::new(key.clone());
        }

        if let Some(level) = vars.get("GATEWAY_LOG_LEVEL") {
            self.observability.logging.level = level.clone();
        }

        if let Some(format) = vars.get("GATEWAY_LOG_FORMAT") {
            self.observability.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(GatewayError::config(format!(
                        "Invalid GATEWAY_LOG_FORMAT: {}",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// Configuration validation with detailed error messages
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        if self.cache.default_ttl.is_zero() {
            errors.push("cache.default_ttl must be greater than 0".to_string());
        }

        if self.cache.max_entries == 0 {
            errors.push("cache.max_entries must be greater than 0".to_string());
        }

        if self.rate_limit.requests_per_window == 0 {
            errors.push("rate_limit.requests_per_window must be greater than 0".to_string());
        }

        if self.rate_limit.window_duration.is_zero() {
            errors.push("rate_limit.window_duration must be greater than 0".to_string());
        }

        for (identity, rule) in &self.rate_limit.overrides {
            if rule.requests_per_window == 0 || rule.window_duration.is_zero() {
                errors.push(format!("rate_limit.overrides.{} must be non-zero", identity));
            }
        }

        for (name, endpoint) in [
            ("news", &self.upstreams.news.base_url),
            ("scrape", &self.upstreams.scrape.base_url),
            ("rewrite", &self.upstreams.rewrite.base_url),
        ] {
            if let Some(base_url) = endpoint {
                if let Err(e) = Url::parse(base_url) {
                    errors.push(format!("upstreams.{}.base_url is invalid: {}", name, e));
                }
            }
        }

        if self.upstreams.news.base_url.is_none() {
            errors.push("upstreams.news.base_url is required".to_string());
        }

        if self.upstreams.rewrite.base_url.is_none() {
            errors.push("upstreams.rewrite.base_url is required".to_string());
        }

        for (name, timeout) in [
            ("news", self.upstreams.news.timeout),
            ("scrape", self.upstreams.scrape.timeout),
            ("rewrite", self.upstreams.rewrite.timeout),
        ] {
            if timeout.is_zero() {
                errors.push(format!("upstreams.{}.timeout must be greater than 0", name));
            }
        }

        if self.routes.languages.is_empty() {
            errors.push("routes.languages must define at least one language".to_string());
        }

        let mut seen = HashSet::new();
        for (language, route) in &self.routes.languages {
            if route.code.trim().is_empty() {
                errors.push(format!("routes.languages.{}.code cannot be empty", language));
            }
            if !seen.insert(route.identity.clone()) {
                errors.push(format!(
                    "routes.languages.{} reuses identity '{}'",
                    language, route.identity
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }

    /// Every identity a route can charge, in a stable order.
    pub fn identities(&self) -> Vec<UpstreamIdentity> {
        let mut identities: Vec<UpstreamIdentity> = self
            .routes
            .languages
            .values()
            .map(|route| route.identity.clone())
            .collect();
        identities.push(self.routes.search_identity.clone());
        identities.push(self.routes.rewrite_identity.clone());
        identities.sort();
        identities.dedup();
        identities
    }
}

fn parse_duration(var: &str, value: &str) -> GatewayResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| GatewayError::config(format!("Invalid {}: {}", var, e)))
}

/// Credential that never shows up in logs or serialized output
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(Option<String>);

impl Secret {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(Some(value.into()))
    }

    /// Raw value, for attaching to outbound requests only
    pub fn expose(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.0.as_deref().map_or(false, |s| !s.is_empty())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_set() {
            f.write_str("Secret(***)")
        } else {
            f.write_str("Secret(unset)")
        }
    }
}

impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_none()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,

    /// HTTP port
    pub http_port: u16,

    /// Time allowed for in-flight requests after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied to every cached upstream payload
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Maximum number of entries held in memory
    pub max_entries: usize,

    /// How often expired entries are purged in the background
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Serialize concurrent misses for the same key so only one reaches upstream
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(12 * 60 * 60),
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(10 * 60),
            coalesce_misses: true,
        }
    }
}

/// Fixed-window quota configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum admitted upstream calls per window
    pub requests_per_window: u32,

    /// Duration of the window
    #[serde(with = "humantime_serde")]
    pub window_duration: Duration,

    /// Identity-specific quotas
    pub overrides: HashMap<UpstreamIdentity, RateLimitRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 30,
            window_duration: Duration::from_secs(15 * 60),
            overrides: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Quota that applies to `identity`
    pub fn rule_for(&self, identity: &UpstreamIdentity) -> RateLimitRule {
        self.overrides.get(identity).cloned().unwrap_or(RateLimitRule {
            requests_per_window: self.requests_per_window,
            window_duration: self.window_duration,
        })
    }
}

/// Identity-specific quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub requests_per_window: u32,
    #[serde(with = "humantime_serde")]
    pub window_duration: Duration,
}

/// Upstream endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamsConfig {
    /// News listing and search API
    pub news: UpstreamEndpoint,

    /// Page fetches for scrape-and-rewrite (no base URL; pages are absolute)
    pub scrape: UpstreamEndpoint,

    /// Chat-completions style text rewrite API
    pub rewrite: RewriteEndpoint,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            news: UpstreamEndpoint {
                base_url: Some("https://newsdata.io/api/1".to_string()),
                ..Default::default()
            },
            scrape: UpstreamEndpoint::default(),
            rewrite: RewriteEndpoint::default(),
        }
    }
}

/// A single upstream endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamEndpoint {
    pub base_url: Option<String>,

    pub api_key: Secret,

    /// Timeout applied to the whole fetch
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for UpstreamEndpoint {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: Secret::default(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Text rewrite endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteEndpoint {
    pub base_url: Option<String>,

    pub api_key: Secret,

    /// Model name sent with every completion request
    pub model: String,

    /// System instruction for the rewrite
    pub instructions: String,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RewriteEndpoint {
    fn default() -> Self {
        Self {
            base_url: Some("https://api.openai.com/v1".to_string()),
            api_key: Secret::default(),
            model: "gpt-4o-mini".to_string(),
            instructions: "Rewrite the following news article in your own words. \
                           Keep every fact, name and number. Answer in {language}."
                .to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Route to identity mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Language path segment -> upstream language code and identity
    pub languages: BTreeMap<String, LanguageRoute>,

    /// Identity charged by the search route
    pub search_identity: UpstreamIdentity,

    /// Identity charged by the scrape-and-rewrite route
    pub rewrite_identity: UpstreamIdentity,

    /// Let the rewrite route fetch loopback, private and link-local hosts
    pub rewrite_allow_private_hosts: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        let mut languages = BTreeMap::new();
        languages.insert(
            "telugu".to_string(),
            LanguageRoute {
                code: "te".to_string(),
                identity: UpstreamIdentity::new("telugu"),
            },
        );
        languages.insert(
            "english".to_string(),
            LanguageRoute {
                code: "en".to_string(),
                identity: UpstreamIdentity::new("english"),
            },
        );

        Self {
            languages,
            search_identity: UpstreamIdentity::new("search"),
            rewrite_identity: UpstreamIdentity::new("rewrite"),
            rewrite_allow_private_hosts: false,
        }
    }
}

/// One language listing route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageRoute {
    /// Language code understood by the news upstream
    pub code: String,

    /// Quota charged by this language
    pub identity: UpstreamIdentity,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "news_gateway=info,tower_http=info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and expose `endpoint_path`
    pub enabled: bool,

    pub endpoint_path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint_path: "/metrics".to_string(),
        }
    }
}
