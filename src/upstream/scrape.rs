//! Article page scraper.
//!
//! The page is downloaded first and parsed afterwards, because `scraper::Html`
//! is not `Send` and must not live across an await point.

use scraper::{Html, Selector};
use url::Url;

use super::{build_http_client, UpstreamError};
use crate::core::config::UpstreamEndpoint;
use crate::core::error::GatewayResult;

/// Content pulled out of an article page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    pub title: Option<String>,
    pub image: Option<String>,
    pub text: String,
}

pub struct PageScraper {
    http: reqwest::Client,
}

impl PageScraper {
    pub fn new(endpoint: &UpstreamEndpoint) -> GatewayResult<Self> {
        Ok(Self {
            http: build_http_client(endpoint.timeout)?,
        })
    }

    pub async fn scrape(&self, url: &Url) -> Result<ScrapedPage, UpstreamError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let html = response.text().await?;
        extract(&html)
    }
}

fn selector(css: &str) -> Result<Selector, UpstreamError> {
    Selector::parse(css).map_err(|e| UpstreamError::Extraction(format!("{:?}", e)))
}

fn meta_content(document: &Html, property: &str) -> Result<Option<String>, UpstreamError> {
    let css = format!("meta[property=\"{}\"]", property);
    Ok(document
        .select(&selector(&css)?)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string))
}

/// Extract title, lead image and paragraph text from an HTML document
pub fn extract(html: &str) -> Result<ScrapedPage, UpstreamError> {
    let document = Html::parse_document(html);

    let title = match meta_content(&document, "og:title")? {
        Some(title) => Some(title),
        None => document
            .select(&selector("title")?)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty()),
    };

    let image = meta_content(&document, "og:image")?;

    let mut paragraphs = paragraph_text(&document, "article p")?;
    if paragraphs.is_empty() {
        paragraphs = paragraph_text(&document, "p")?;
    }

    if paragraphs.is_empty() {
        return Err(UpstreamError::Extraction(
            "page has no paragraph text".to_string(),
        ));
    }

    Ok(ScrapedPage {
        title,
        image,
        text: paragraphs.join("\n\n"),
    })
}

fn paragraph_text(document: &Html, css: &str) -> Result<Vec<String>, UpstreamError> {
    Ok(document
        .select(&selector(css)?)
        .map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join("")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|p| !p.is_empty())
        .collect())
}
