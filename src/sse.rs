//! Event-stream re-framing.
//!
//! The Messages API streams `content_block_delta` events among several
//! other event types. Callers of the AI endpoints only want the text, so the
//! upstream stream is rewritten to:
//!
//! ```text
//! data: {"text":"Hel"}
//!
//! data: {"text":"lo"}
//!
//! data: [DONE]
//! ```
//!
//! Upstream lines may be split across network reads at any byte, including
//! inside a multi-byte character; the unterminated tail is kept until the
//! rest arrives.

use axum::body::Bytes;
use futures::{stream, Stream, StreamExt};
use serde_json::Value;
use std::io;

/// Terminal event emitted once the upstream closes.
pub const DONE_EVENT: &str = "data: [DONE]\n\n";

const DATA_PREFIX: &str = "data: ";

/// Line-buffered decoder that pulls text deltas out of upstream SSE bytes.
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    pending: Vec<u8>,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read; returns the deltas from every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        // '\n' never occurs inside a UTF-8 sequence, so complete lines decode cleanly
        String::from_utf8_lossy(&complete)
            .split('\n')
            .filter_map(delta_text)
            .collect()
    }

    /// Flush whatever is left once the upstream has closed.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        delta_text(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Text of a `content_block_delta` data line, if that is what the line is.
///
/// Non-JSON data lines and other event types are skipped.
pub fn delta_text(line: &str) -> Option<String> {
    let data = line.trim_end_matches('\r').strip_prefix(DATA_PREFIX)?;
    let event: Value = serde_json::from_str(data).ok()?;

    if event.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return None;
    }

    event
        .get("delta")
        .and_then(|d| d.get("text"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Encode one delta as a downstream event.
pub fn text_event(text: &str) -> String {
    format!("{}{}\n\n", DATA_PREFIX, serde_json::json!({ "text": text }))
}

fn encode_all(deltas: &[String]) -> String {
    deltas.iter().map(|d| text_event(d)).collect()
}

/// A parsed downstream event, as a consumer of the re-framed stream sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Text(String),
    Done,
}

/// Parse one downstream line. Non-JSON payloads are treated as raw text.
pub fn parse_client_line(line: &str) -> Option<ClientEvent> {
    let data = line.trim_end_matches('\r').strip_prefix(DATA_PREFIX)?;
    if data == "[DONE]" {
        return Some(ClientEvent::Done);
    }
    match serde_json::from_str::<Value>(data) {
        Ok(value) => value
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(|t| ClientEvent::Text(t.to_string())),
        Err(_) => Some(ClientEvent::Text(data.to_string())),
    }
}

/// Collect the text of a complete downstream body, stopping at `[DONE]`.
pub fn collect_text(body: &str) -> String {
    let mut text = String::new();
    for line in body.lines() {
        match parse_client_line(line) {
            Some(ClientEvent::Text(t)) => text.push_str(&t),
            Some(ClientEvent::Done) => break,
            None => {}
        }
    }
    text
}

/// Rewrite an upstream SSE byte stream into `{text}` events plus `[DONE]`.
///
/// An upstream read error ends the stream with that error and no `[DONE]`.
/// Dropping the returned stream drops the upstream connection.
pub fn reframe<S, E>(upstream: S) -> impl Stream<Item = Result<Bytes, io::Error>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let upstream = Box::pin(upstream);

    stream::unfold(Some((upstream, DeltaDecoder::new())), |state| async move {
        let (mut upstream, mut decoder) = state?;
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    let events = encode_all(&decoder.push(&chunk));
                    if !events.is_empty() {
                        return Some((Ok(Bytes::from(events)), Some((upstream, decoder))));
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Upstream stream failed");
                    return Some((Err(io::Error::other(e.to_string())), None));
                }
                None => {
                    let mut tail = encode_all(&decoder.finish());
                    tail.push_str(DONE_EVENT);
                    return Some((Ok(Bytes::from(tail)), None));
                }
            }
        }
    })
}
