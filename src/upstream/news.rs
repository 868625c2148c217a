//! News listing and search client.
//!
//! Talks to a newsdata-style API (`GET {base}/latest?apikey=..&language=..`)
//! and normalizes its answer to
//! `{ "articles": [...], "next_page": ..., "total": ... }`.

use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{build_http_client, endpoint_url, UpstreamError};
use crate::core::config::{Secret, UpstreamEndpoint};
use crate::core::error::{GatewayError, GatewayResult};

/// Filters for a listing or search call
#[derive(Debug, Clone, Default)]
pub struct NewsQuery<'a> {
    pub query: Option<&'a str>,
    /// Language code understood by the upstream (`te`, `en`)
    pub language: Option<&'a str>,
    pub category: Option<&'a str>,
    /// Opaque page token from a previous `next_page`
    pub page: Option<&'a str>,
}

impl<'a> NewsQuery<'a> {
    fn to_params(&self) -> Vec<(&'static str, &'a str)> {
        [
            ("q", self.query),
            ("language", self.language),
            ("category", self.category),
            ("page", self.page),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.filter(|v| !v.is_empty()).map(|v| (name, v)))
        .collect()
    }
}

pub struct NewsClient {
    http: reqwest::Client,
    latest_url: Url,
    api_key: Secret,
}

impl NewsClient {
    pub fn new(endpoint: &UpstreamEndpoint) -> GatewayResult<Self> {
        let base_url = endpoint
            .base_url
            .as_deref()
            .ok_or_else(|| GatewayError::config("upstreams.news.base_url is required"))?;

        Ok(Self {
            http: build_http_client(endpoint.timeout)?,
            latest_url: endpoint_url(base_url, "latest")?,
            api_key: endpoint.api_key.clone(),
        })
    }

    /// Latest headlines for a language, optionally filtered by category
    pub async fn latest(&self, query: &NewsQuery<'_>) -> Result<Value, UpstreamError> {
        self.fetch(query).await
    }

    /// Free-text search
    pub async fn search(&self, query: &NewsQuery<'_>) -> Result<Value, UpstreamError> {
        self.fetch(query).await
    }

    async fn fetch(&self, query: &NewsQuery<'_>) -> Result<Value, UpstreamError> {
        let mut request = self.http.get(self.latest_url.clone()).query(&query.to_params());
        if let Some(key) = self.api_key.expose() {
            request = request.query(&[("apikey", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.without_url().to_string()))?;

        let normalized = normalize_listing(body)?;
        debug!(
            articles = normalized["articles"].as_array().map_or(0, Vec::len),
            "News upstream answered"
        );
        Ok(normalized)
    }
}

/// Reduce an upstream listing to the gateway's payload shape
pub fn normalize_listing(body: Value) -> Result<Value, UpstreamError> {
    if body.get("status").and_then(Value::as_str) == Some("error") {
        return Err(UpstreamError::Decode(
            "upstream reported an error status".to_string(),
        ));
    }

    let articles = body
        .get("results")
        .or_else(|| body.get("articles"))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| UpstreamError::Decode("missing results array".to_string()))?;

    Ok(json!({
        "articles": articles,
        "next_page": body.get("nextPage").cloned().unwrap_or(Value::Null),
        "total": body.get("totalResults").cloned().unwrap_or(Value::Null),
    }))
}
