//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; the decoder buffers partial lines and
//! yields complete items once a blank line terminates a frame. Field handling
//! follows the HTML event-stream interpretation rules:
//!
//! - `event:` sets the frame name (default `message`)
//! - `data:` lines are joined with `\n`
//! - `id:` sets the last event id (ignored if it contains NUL)
//! - `retry:` sets the reconnection hint when it is all ASCII digits
//! - lines starting with `:` are comments (servers use them as keep-alives)

use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::{StreamError, StreamResult};

/// Frame name used when the server does not send an `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Default limit for one frame (partial line plus accumulated data).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name.
    pub event: String,
    /// Payload, `data:` lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream, if any.
    pub id: Option<String>,
    /// Server reconnection hint.
    pub retry: Option<Duration>,
}

impl SseFrame {
    /// Create a frame with the given name and payload.
    #[must_use]
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
            retry: None,
        }
    }

    /// Check the frame name.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.event == name
    }
}

/// Item produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    /// A complete frame.
    Frame(SseFrame),
    /// A comment line (keep-alive).
    Comment(String),
}

/// Incremental decoder state.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: BytesMut,
    event: Option<String>,
    data: String,
    has_data: bool,
    last_id: Option<String>,
    retry: Option<Duration>,
    max_frame_bytes: usize,
    started: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl SseDecoder {
    /// Create a decoder that rejects frames larger than `max_frame_bytes`.
    #[must_use]
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            event: None,
            data: String::new(),
            has_data: false,
            last_id: None,
            retry: None,
            max_frame_bytes,
            started: false,
        }
    }

    /// Feed a chunk of bytes and collect every item it completes.
    ///
    /// # Errors
    /// Returns [`StreamError::BufferOverflow`] when a single frame exceeds the
    /// configured limit. The decoder should be discarded afterwards.
    pub fn push(&mut self, chunk: &[u8]) -> StreamResult<Vec<SseItem>> {
        self.buffer.extend_from_slice(chunk);

        if !self.started {
            if self.buffer.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(&self.buffer[..]) {
                return Ok(Vec::new());
            }
            if self.buffer.starts_with(UTF8_BOM) {
                self.buffer.advance(UTF8_BOM.len());
            }
            self.started = true;
        }

        let mut items = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(newline_pos + 1);
            let mut line = &raw[..newline_pos];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            let line = String::from_utf8_lossy(line);
            if let Some(item) = self.process_line(&line) {
                items.push(item);
            }
        }

        let size = self.buffer.len() + self.data.len();
        if size > self.max_frame_bytes {
            return Err(StreamError::BufferOverflow {
                size,
                limit: self.max_frame_bytes,
            });
        }

        Ok(items)
    }

    /// Last event id seen so far.
    #[must_use]
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    fn process_line(&mut self, line: &str) -> Option<SseItem> {
        if line.is_empty() {
            return self.dispatch();
        }

        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseItem::Comment(comment.trim_start().to_string()));
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseItem> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseItem::Frame(SseFrame {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
            data: std::mem::take(&mut self.data),
            id: self.last_id.clone(),
            retry: self.retry,
        }))
    }
}
