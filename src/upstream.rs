//! Anthropic Messages API client.
//!
//! Only streaming calls are made. A non-2xx answer is turned into
//! [`FluencyError::Upstream`] carrying the original status and body.

use crate::config::UpstreamConfig;
use crate::error::FluencyError;
use crate::http::create_streaming_client;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    system: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    messages_url: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// `None` when no API key is configured.
    pub fn from_config(config: &UpstreamConfig) -> Option<Self> {
        let api_key = config.api_key.as_deref().filter(|k| !k.is_empty())?;
        Some(Self {
            client: create_streaming_client(),
            messages_url: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            api_version: config.api_version.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Open a streaming completion.
    pub async fn stream_messages(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<Response, FluencyError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            stream: true,
            system,
            messages,
        };

        let response = self
            .client
            .post(&self.messages_url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| FluencyError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Upstream rejected request");
            return Err(FluencyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}
