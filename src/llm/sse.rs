//! Incremental decoding of the Messages API server-sent-event body.
//!
//! Frames are separated by a blank line. Only the `data:` field matters; the
//! `event:` name is repeated inside the JSON `type`. Bytes are buffered
//! rather than text so a multi-byte character split across chunks is never
//! mangled.

use serde::Deserialize;

use crate::errors::LlmError;

/// What one SSE frame means for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// A text increment
    Text(String),
    /// `message_stop`: no more deltas follow
    Stop,
    /// Bookkeeping frame (ping, message_start, block start/stop, ...)
    Ignore,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    ContentBlockDelta { delta: WireDelta },
    MessageStop,
    Error { error: WireError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Splits a byte stream into complete SSE `data` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no frame separator
    scanned: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning the data payloads of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        // A separator may straddle the old tail and the new chunk
        let mut from = self.scanned.saturating_sub(3);
        while let Some((end, sep_len)) = find_frame_end(&self.buffer, from) {
            let frame: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            let text = String::from_utf8_lossy(&frame);
            if let Some(data) = frame_data(&text) {
                payloads.push(data);
            }
            from = 0;
        }
        self.scanned = self.buffer.len();

        payloads
    }

    /// Payload of a trailing frame that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let text = String::from_utf8_lossy(&rest);
        frame_data(&text)
    }
}

/// First frame separator at or after `from`: its offset and length.
fn find_frame_end(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    for i in from..buf.len() {
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if buf[i..].starts_with(b"\n\n") {
            return Some((i, 2));
        }
    }
    None
}

/// Join the `data:` lines of one frame. Comments and other fields are dropped.
fn frame_data(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Interpret one data payload.
pub fn parse_event(data: &str) -> Result<StreamItem, LlmError> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(StreamItem::Ignore);
    }

    let event: WireEvent = serde_json::from_str(data).map_err(|e| {
        LlmError::Parse(format!(
            "invalid stream event: {} - data: {}",
            e,
            crate::util::truncate_chars(data, 200)
        ))
    })?;

    match event {
        WireEvent::ContentBlockDelta {
            delta: WireDelta::TextDelta { text },
        } => Ok(StreamItem::Text(text)),
        WireEvent::MessageStop => Ok(StreamItem::Stop),
        WireEvent::Error { error } => Err(LlmError::Stream(format!(
            "{}: {}",
            error.kind, error.message
        ))),
        _ => Ok(StreamItem::Ignore),
    }
}
