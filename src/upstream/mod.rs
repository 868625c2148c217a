//! # Upstream Collaborators
//!
//! HTTP clients for the third-party services behind the gateway:
//! - [`NewsClient`]: latest-news listing and search
//! - [`PageScraper`]: fetches an article page and extracts its text
//! - [`Rewriter`]: rewrites extracted text through a chat-completions API
//!
//! None of them know about caching or quotas. The admission layer treats each
//! call as an opaque fetch that yields a normalized JSON payload or an
//! [`UpstreamError`].

pub mod news;
pub mod rewrite;
pub mod scrape;

pub use news::{NewsClient, NewsQuery};
pub use rewrite::Rewriter;
pub use scrape::{PageScraper, ScrapedPage};

use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::core::config::UpstreamsConfig;
use crate::core::error::{GatewayError, GatewayResult};

/// Failures talking to an upstream
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level failure. The request URL is stripped so credentials in
    /// query strings never reach the logs.
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("Upstream returned status {status}")]
    Status { status: u16 },

    #[error("Failed to decode upstream payload: {0}")]
    Decode(String),

    #[error("Content extraction failed: {0}")]
    Extraction(String),

    #[error("Upstream did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

/// Every upstream client the routes need
pub struct Upstreams {
    pub news: NewsClient,
    pub scraper: PageScraper,
    pub rewriter: Rewriter,
}

impl Upstreams {
    /// Build clients from configuration
    pub fn from_config(config: &UpstreamsConfig) -> GatewayResult<Self> {
        Ok(Self {
            news: NewsClient::new(&config.news)?,
            scraper: PageScraper::new(&config.scrape)?,
            rewriter: Rewriter::new(&config.rewrite)?,
        })
    }

    /// Scrape `url`, rewrite its text in `language`, and return the combined payload
    pub async fn scrape_and_rewrite(
        &self,
        url: &Url,
        language: &str,
    ) -> Result<Value, UpstreamError> {
        let page = self.scraper.scrape(url).await?;
        let rewritten = self.rewriter.rewrite(&page.text, language).await?;

        Ok(json!({
            "url": url.as_str(),
            "title": page.title,
            "image": page.image,
            "original_text": page.text,
            "rewritten_text": rewritten,
            "language": language,
        }))
    }
}

/// Shared reqwest client construction
pub(crate) fn build_http_client(timeout: Duration) -> GatewayResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("news-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GatewayError::config(format!("Failed to build HTTP client: {}", e)))
}

/// Join `path` onto a configured base URL, tolerating a trailing slash
pub(crate) fn endpoint_url(base_url: &str, path: &str) -> GatewayResult<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined)
        .map_err(|e| GatewayError::config(format!("Invalid upstream URL {}: {}", joined, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let url = endpoint_url("https://newsdata.io/api/1", "latest").unwrap();
        assert_eq!(url.as_str(), "https://newsdata.io/api/1/latest");

        let url = endpoint_url("http://localhost:8000/v1/", "/chat/completions").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_status_error_message() {
        let err = UpstreamError::Status { status: 502 };
        assert_eq!(err.to_string(), "Upstream returned status 502");
    }
}
