//! SSE decoding for streamed chat responses.
//!
//! The backend frames its reply as server-sent events: `chunk` events carry
//! incremental text, `agent_complete` the final record, `error` a failure,
//! and the literal `[DONE]` data sentinel ends the stream.

use std::pin::Pin;

use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;
use serde_json::Value;
use tracing::debug;

use crate::api::{ApiError, ApiResult};

/// Data payload marking end-of-stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Events decoded from the chat stream. Transient; consumed immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatStreamEvent {
    /// Incremental text fragment of the reply.
    Chunk(String),
    /// Reply finished. `Some` carries the completion record from an
    /// `agent_complete` frame; `None` is the `[DONE]` sentinel and is
    /// terminal.
    Completed(Option<Value>),
    /// Error frame from the backend.
    Error(String),
    /// Informational frame (`user_message`, `agent_start`, ...); no-op for
    /// consumers.
    Status(String),
}

/// SSE parser that converts a byte stream into `ChatStreamEvent`s.
///
/// Line buffering, CRLF handling, and UTF-8 sequences split across reads are
/// handled by the framing layer; this type owns the dispatch rules. After the
/// `[DONE]` sentinel (or a read error) the stream is fused.
pub struct SseParser<S> {
    inner: EventStream<S>,
    finished: bool,
}

impl<S> SseParser<S> {
    pub fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
            finished: false,
        }
    }
}

impl<S, E> Stream for SseParser<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = ApiResult<ChatStreamEvent>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        if self.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                let decoded = parse_frame(&event.event, &event.data);
                if decoded == ChatStreamEvent::Completed(None) {
                    self.finished = true;
                }
                Poll::Ready(Some(Ok(decoded)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Read errors are surfaced once; the stream is not retried.
                self.finished = true;
                Poll::Ready(Some(Err(ApiError::parse(format!("SSE stream error: {e}")))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Decodes a single SSE frame (event name + data payload).
pub fn parse_frame(event: &str, data: &str) -> ChatStreamEvent {
    let data = data.trim();

    if data == DONE_SENTINEL {
        return ChatStreamEvent::Completed(None);
    }

    match serde_json::from_str::<Value>(data) {
        Ok(payload) => dispatch_payload(event, data, &payload),
        Err(_) => {
            if data.is_empty() {
                ChatStreamEvent::Status(event.to_string())
            } else {
                // Malformed frames degrade to raw text instead of being lost.
                debug!("non-JSON SSE payload, forwarding as raw chunk");
                ChatStreamEvent::Chunk(data.to_string())
            }
        }
    }
}

/// Dispatch rules for well-formed JSON payloads, in priority order.
fn dispatch_payload(event: &str, raw: &str, payload: &Value) -> ChatStreamEvent {
    if event == "chunk" || payload.get("chunk").is_some() {
        let text = payload
            .get("chunk")
            .and_then(Value::as_str)
            .unwrap_or(raw);
        return ChatStreamEvent::Chunk(text.to_string());
    }

    if event == "agent_complete" || payload.get("chatHistory").is_some() {
        let record = payload
            .get("chatHistory")
            .cloned()
            .unwrap_or_else(|| payload.clone());
        return ChatStreamEvent::Completed(Some(record));
    }

    if event == "error" || payload.get("error").is_some() {
        let message = payload
            .get("error")
            .or_else(|| payload.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return ChatStreamEvent::Error(message.to_string());
    }

    ChatStreamEvent::Status(event.to_string())
}
