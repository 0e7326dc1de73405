// Shared fixtures for the endpoint tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use edge_gate::completion::{ChatMessage, CompletionClient, CompletionError, TextStream};
use edge_gate::gate::rules::{bot_rules, rate_limit_rules};
use edge_gate::gate::{
    BotCategory, Decision, FailureMode, Gate, GateError, GateResult, Guard, LocalGate, Mode,
    RequestDetails,
};
use edge_gate::server::AppState;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const BROWSER_UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

pub type ChunkSender = UnboundedSender<Result<Bytes, CompletionError>>;

enum Reply {
    Chunks(Vec<&'static str>),
    Channel(Mutex<Option<UnboundedReceiver<Result<Bytes, CompletionError>>>>),
    Fail,
}

/// Completion client with a scripted reply that records what it was asked.
pub struct FakeCompletions {
    reply: Reply,
    pub calls: AtomicUsize,
    pub last_messages: Mutex<Vec<ChatMessage>>,
}

impl std::fmt::Debug for FakeCompletions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeCompletions")
            .field("calls", &self.calls)
            .finish()
    }
}

impl FakeCompletions {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(chunks: Vec<&'static str>) -> Self {
        Self::with_reply(Reply::Chunks(chunks))
    }

    pub fn failing() -> Self {
        Self::with_reply(Reply::Fail)
    }

    /// Reply driven by the returned sender; the stream ends when it drops.
    pub fn channel() -> (Self, ChunkSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_reply(Reply::Channel(Mutex::new(Some(rx)))), tx)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for FakeCompletions {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TextStream, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages;

        match &self.reply {
            Reply::Chunks(chunks) => {
                let items: Vec<Result<Bytes, CompletionError>> = chunks
                    .iter()
                    .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                    .collect();
                Ok(Box::pin(futures_util::stream::iter(items)))
            }
            Reply::Channel(rx) => {
                let rx = rx
                    .lock()
                    .unwrap()
                    .take()
                    .ok_or_else(|| CompletionError::Stream("reply already taken".to_string()))?;
                Ok(Box::pin(UnboundedReceiverStream::new(rx)))
            }
            Reply::Fail => Err(CompletionError::Upstream {
                status: 500,
                body: "upstream exploded".to_string(),
            }),
        }
    }
}

/// Gate that always errors, as an unreachable decision service would.
#[derive(Debug, Default)]
pub struct UnreachableGate {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Gate for UnreachableGate {
    async fn protect(&self, _details: &RequestDetails) -> GateResult<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GateError::Network("connection refused".to_string()))
    }

    fn backend(&self) -> &'static str {
        "unreachable"
    }
}

/// The published rate limit: one request per minute, ten minute cooldown.
pub fn default_rate_limit() -> Guard {
    let gate = LocalGate::new(rate_limit_rules(
        Duration::from_secs(60),
        1,
        Duration::from_secs(600),
    ));
    Guard::new("rate_limit", Arc::new(gate), FailureMode::Open)
}

pub fn default_bot_guard() -> Guard {
    let gate = LocalGate::new(bot_rules(Mode::Live, vec![BotCategory::Automated]));
    Guard::new("bot_detection", Arc::new(gate), FailureMode::Open)
}

/// State with `demo_rate_limit` on `/api/arcjet` and a fresh default limit
/// on `/api/chat`.
pub fn state(demo_rate_limit: Guard, completions: Arc<FakeCompletions>) -> AppState {
    state_with_limits(demo_rate_limit, default_rate_limit(), completions)
}

pub fn state_with_limits(
    demo_rate_limit: Guard,
    chat_rate_limit: Guard,
    completions: Arc<FakeCompletions>,
) -> AppState {
    AppState::new(demo_rate_limit, chat_rate_limit, completions, 64 * 1024)
}

pub fn excluded_paths() -> Vec<String> {
    edge_gate::middleware::DEFAULT_EXCLUDED_PREFIXES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Initialise the full application the way the server wires it.
macro_rules! test_app {
    ($state:expr, $bot_guard:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state))
                .wrap(edge_gate::middleware::BotGateMiddleware::new(
                    $bot_guard,
                    $crate::common::excluded_paths(),
                ))
                .configure(edge_gate::server::configure)
                .default_service(actix_web::web::route().to(edge_gate::server::sink_handler)),
        )
        .await
    };
}
