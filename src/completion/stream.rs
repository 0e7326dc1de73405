//! Server-sent event decoding and the text relay.
//!
//! The upstream emits `data: {json}` events separated by blank lines. Each
//! event's `choices[0].delta.content` is forwarded as plain text the moment
//! its block is complete; `data: [DONE]` ends the relay.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use super::{CompletionError, TextStream};

/// Accumulates raw upstream bytes and yields complete SSE blocks.
///
/// Text is only decoded once a whole block has arrived, so a multibyte
/// character split across network chunks is reassembled before decoding.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    buf: BytesMut,
    // Bytes before this offset hold no block separator.
    scanned: usize,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk with CRLF folded to LF. A CR at the end of the
    /// buffer is folded when the next chunk opens with LF.
    pub fn push(&mut self, chunk: &[u8]) {
        let mut bytes = chunk.iter().copied().peekable();
        if self.buf.last() == Some(&b'\r') && bytes.peek() == Some(&b'\n') {
            self.buf.truncate(self.buf.len() - 1);
            self.scanned = self.scanned.min(self.buf.len());
        }
        self.buf.reserve(chunk.len());
        while let Some(byte) = bytes.next() {
            if byte == b'\r' && bytes.peek() == Some(&b'\n') {
                continue;
            }
            self.buf.put_u8(byte);
        }
    }

    /// Next complete non-empty block, without its trailing blank line.
    pub fn next_block(&mut self) -> Option<String> {
        loop {
            let from = self.scanned.saturating_sub(1);
            let Some(offset) = self.buf[from..].windows(2).position(|w| w == b"\n\n") else {
                self.scanned = self.buf.len();
                return None;
            };
            let pos = from + offset;
            let raw = self.buf.split_to(pos + 2);
            self.scanned = 0;
            let block = String::from_utf8_lossy(&raw[..pos]);
            if !block.trim().is_empty() {
                return Some(block.into_owned());
            }
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.buf.iter().any(|b| !b.is_ascii_whitespace())
    }

    /// Drain whatever follows the last complete block.
    pub fn take_remaining(&mut self) -> String {
        self.scanned = 0;
        let tail = self.buf.split();
        String::from_utf8_lossy(&tail).into_owned()
    }
}

/// Join the `data:` lines of a block. Comments and other fields are ignored.
pub(crate) fn parse_sse_data(block: &str) -> Cow<'_, str> {
    let data_lines: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    match data_lines.as_slice() {
        [] => Cow::Borrowed(""),
        [single] => Cow::Borrowed(*single),
        _ => Cow::Owned(data_lines.join("\n")),
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Text(String),
    Done,
    Skip,
    Error(String),
}

/// Interpret one SSE block from a chat completion stream.
pub(crate) fn interpret_block(block: &str) -> SseEvent {
    let data = parse_sse_data(block);
    let data = data.trim();
    if data.is_empty() {
        return SseEvent::Skip;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            warn!("Skipping undecodable completion event: {}", e);
            return SseEvent::Skip;
        }
    };

    if let Some(error) = parsed.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return SseEvent::Error(message);
    }

    let choice = parsed.get("choices").and_then(|c| c.get(0));
    let text = choice
        .and_then(|c| c.pointer("/delta/content"))
        .or_else(|| choice.and_then(|c| c.get("text")))
        .and_then(Value::as_str);

    match text {
        Some(t) if !t.is_empty() => SseEvent::Text(t.to_string()),
        _ => SseEvent::Skip,
    }
}

/// Forward one block. Returns false once the relay should stop.
fn forward_block(
    block: &str,
    tx: &mpsc::UnboundedSender<Result<Bytes, CompletionError>>,
) -> bool {
    match interpret_block(block) {
        SseEvent::Text(text) => tx.send(Ok(Bytes::from(text))).is_ok(),
        SseEvent::Skip => true,
        SseEvent::Done => false,
        SseEvent::Error(message) => {
            warn!("Completion stream reported an error: {}", message);
            let _ = tx.send(Err(CompletionError::Stream(message)));
            false
        }
    }
}

/// Convert an upstream SSE byte stream into a text stream.
///
/// A spawned task drives the upstream and pushes each fragment into an
/// unbounded channel as soon as it is decoded. The task ends on `[DONE]`,
/// upstream end or error, or when the receiving side is dropped.
pub fn relay_text_stream<S, E>(upstream: S) -> TextStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes, CompletionError>>();

    tokio::spawn(async move {
        let mut upstream = std::pin::pin!(upstream);
        let mut buffer = SseBuffer::new();

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(chunk) => {
                    buffer.push(&chunk);
                    while let Some(block) = buffer.next_block() {
                        if !forward_block(&block, &tx) {
                            debug!("Completion relay finished");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("Completion upstream failed mid-stream: {}", e);
                    let _ = tx.send(Err(CompletionError::Stream(e.to_string())));
                    return;
                }
            }
        }

        if buffer.has_remaining() {
            let tail = buffer.take_remaining();
            forward_block(&tail, &tx);
        }
        debug!("Completion upstream closed");
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}
