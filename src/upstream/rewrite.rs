//! Text rewrite client for an OpenAI-compatible chat-completions endpoint.

use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{build_http_client, endpoint_url, UpstreamError};
use crate::core::config::{RewriteEndpoint, Secret};
use crate::core::error::{GatewayError, GatewayResult};

pub struct Rewriter {
    http: reqwest::Client,
    completions_url: Url,
    api_key: Secret,
    model: String,
    instructions: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl Rewriter {
    pub fn new(endpoint: &RewriteEndpoint) -> GatewayResult<Self> {
        let base_url = endpoint
            .base_url
            .as_deref()
            .ok_or_else(|| GatewayError::config("upstreams.rewrite.base_url is required"))?;

        Ok(Self {
            http: build_http_client(endpoint.timeout)?,
            completions_url: endpoint_url(base_url, "chat/completions")?,
            api_key: endpoint.api_key.clone(),
            model: endpoint.model.clone(),
            instructions: endpoint.instructions.clone(),
        })
    }

    /// Rewrite `text` in `language`
    pub async fn rewrite(&self, text: &str, language: &str) -> Result<String, UpstreamError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.instructions.replace("{language}", language) },
                { "role": "user", "content": text },
            ],
        });

        let mut request = self.http.post(self.completions_url.clone()).json(&body);
        if let Some(key) = self.api_key.expose() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.without_url().to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| UpstreamError::Decode("completion had no content".to_string()))
    }
}
