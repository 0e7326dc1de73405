//! Streaming chat completions.

pub mod openai;
pub mod stream;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use openai::{OpenAiClient, OpenAiConfig};

/// One chat turn. Fields other than `role` and `content` are carried through
/// untouched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }
}

/// Body accepted by the chat endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion service unreachable: {0}")]
    Network(String),

    #[error("Completion service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Completion stream failed: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        CompletionError::Network(err.to_string())
    }
}

/// Incremental completion text, one item per upstream fragment.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<Bytes, CompletionError>> + Send>>;

#[async_trait]
pub trait CompletionClient: Send + Sync + std::fmt::Debug {
    /// Start a streaming completion. Resolves once the upstream has accepted
    /// the request; the text then arrives through the returned stream.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TextStream, CompletionError>;
}
