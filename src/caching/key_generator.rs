//! # Cache Key Generator
//!
//! Deterministic cache keys built from a route name and every query parameter
//! that changes the upstream result.
//!
//! Rendering is `route?name=value&name=value` in the order parameters were
//! added. Values are percent-encoded, so an absent parameter can be rendered
//! as the bare placeholder `*` without colliding with any explicit value,
//! including the empty string.

use sha2::{Digest, Sha256};
use std::fmt;

/// Placeholder for a parameter the caller did not supply
pub const ABSENT_PLACEHOLDER: &str = "*";

/// Keys longer than this are replaced by a hash
pub const MAX_KEY_LENGTH: usize = 250;

/// A fully rendered cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start building a key for `route`
    pub fn builder(route: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            route: route.to_string(),
            params: Vec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Builder for [`CacheKey`]
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    route: String,
    params: Vec<(String, Option<String>)>,
}

impl CacheKeyBuilder {
    /// Add a case-sensitive parameter. Values are trimmed.
    pub fn param(mut self, name: &str, value: Option<&str>) -> Self {
        self.params
            .push((name.to_string(), value.map(|v| v.trim().to_string())));
        self
    }

    /// Add a parameter whose value is compared case-insensitively
    pub fn param_folded(mut self, name: &str, value: Option<&str>) -> Self {
        self.params
            .push((name.to_string(), value.map(|v| v.trim().to_lowercase())));
        self
    }

    /// Add a numeric parameter
    pub fn param_num<N: ToString>(self, name: &str, value: Option<N>) -> Self {
        let rendered = value.map(|n| n.to_string());
        self.param(name, rendered.as_deref())
    }

    pub fn build(self) -> CacheKey {
        let query = self
            .params
            .iter()
            .map(|(name, value)| {
                let rendered = match value {
                    Some(v) => urlencoding::encode(v).into_owned(),
                    None => ABSENT_PLACEHOLDER.to_string(),
                };
                format!("{}={}", urlencoding::encode(name), rendered)
            })
            .collect::<Vec<_>>()
            .join("&");

        let key = format!("{}?{}", self.route, query);
        CacheKey(truncate_key(&self.route, key))
    }
}

/// Hash keys that exceed [`MAX_KEY_LENGTH`] so they stay bounded
fn truncate_key(route: &str, key: String) -> String {
    if key.len() <= MAX_KEY_LENGTH {
        key
    } else {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{}#{}", route, hex::encode(hasher.finalize()))
    }
}
