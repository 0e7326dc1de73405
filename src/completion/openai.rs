use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Serialize;
use tracing::{debug, warn};

use super::stream::relay_text_stream;
use super::{ChatMessage, CompletionClient, CompletionError, TextStream};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub connect_timeout: Duration,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatCompletionPayload<'a> {
    model: &'a str,
    stream: bool,
    messages: &'a [ChatMessage],
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, CompletionError> {
        // Connect timeout only; stream duration is unbounded.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Some(Duration::from_secs(50)))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key,
            model: config.model,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TextStream, CompletionError> {
        debug!(
            model = %self.model,
            messages = messages.len(),
            "Starting streaming chat completion"
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(ACCEPT, "text/event-stream")
            .json(&ChatCompletionPayload {
                model: &self.model,
                stream: true,
                messages: &messages,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Completion request rejected upstream");
            return Err(CompletionError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(relay_text_stream(resp.bytes_stream()))
    }
}
