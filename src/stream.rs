//! Server-sent event decoding for chat-completion streams.
//!
//! OpenRouter answers a `stream: true` request with `text/event-stream` lines:
//!
//! ```text
//! : OPENROUTER PROCESSING
//! data: {"choices":[{"delta":{"content":"4"}}]}
//! data: [DONE]
//! ```
//!
//! [`SseDecoder`] buffers raw bytes so that a frame split across network
//! chunks (including in the middle of a multi-byte character) is only
//! decoded once its line is complete.

use serde::Deserialize;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One decoded `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Delta(String),
    Done,
    ProviderError(String),
    Malformed { payload: String, reason: String },
}

/// Receives progress while a response is streamed.
pub trait StreamObserver {
    /// The server accepted the request and the body is about to be read.
    fn on_connected(&mut self) {}

    fn on_delta(&mut self, _delta: &str) {}

    fn on_malformed(&mut self, _payload: &str, _reason: &str) {}

    /// Runs `emit` with any transient output taken off the terminal, so
    /// diagnostics written to stderr get a line of their own.
    fn suspend(&mut self, emit: &mut dyn FnMut()) {
        emit();
    }
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
    #[serde(default)]
    error: Option<ChunkError>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(frame) = decode_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decodes whatever is left once the body has ended without a trailing newline.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(raw: &[u8]) -> Option<Frame> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line,
        Err(err) => {
            return Some(Frame::Malformed {
                payload: String::from_utf8_lossy(raw).into_owned(),
                reason: format!("invalid UTF-8: {err}"),
            });
        }
    };
    parse_line(line)
}

/// Parses a single event-stream line. Comments, blank lines and non-data
/// fields yield `None`.
pub fn parse_line(line: &str) -> Option<Frame> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(Frame::Done);
    }

    let chunk: ChunkPayload = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            return Some(Frame::Malformed {
                payload: payload.to_string(),
                reason: err.to_string(),
            });
        }
    };

    if let Some(error) = chunk.error {
        return Some(Frame::ProviderError(describe_error(&error)));
    }

    let choices = chunk.choices?;
    // Usage-only chunks carry no choices.
    if choices.is_empty() && chunk.usage.is_none() {
        return Some(Frame::Malformed {
            payload: payload.to_string(),
            reason: "chunk has an empty choices list".to_string(),
        });
    }

    choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty())
        .map(Frame::Delta)
}

fn describe_error(error: &ChunkError) -> String {
    let message = error
        .message
        .as_deref()
        .filter(|message| !message.trim().is_empty())
        .unwrap_or("unknown provider error");
    match &error.code {
        Some(code) => format!("{message} (code {code})"),
        None => message.to_string(),
    }
}
