//! Server-Sent Events decoding.
//!
//! `text/event-stream` bodies are split into events on blank lines. Only the
//! `data`, `event` and `id` fields are kept; comments and `retry` hints are
//! dropped (reconnect policy belongs to the caller).

use anyhow::{Context, Result};
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use tracing::{trace, warn};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

/// Stream of decoded events; ends when the server closes the connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent>> + Send>>;

/// Longest line the decoder will buffer before dropping it.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Incremental decoder. Chunks may split lines, or UTF-8 sequences, anywhere.
#[derive(Debug)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already searched for a line end.
    scanned: usize,
    max_line: usize,
    /// Skipping the rest of an oversized line.
    discarding: bool,
    event: Option<String>,
    id: Option<String>,
    data: Vec<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line,
            discarding: false,
            event: None,
            id: None,
            data: Vec::new(),
        }
    }

    /// Bytes held for an unfinished line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Feed a chunk and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(off) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + off;
            self.scanned = end + 1;
            let line_start = std::mem::replace(&mut start, end + 1);
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            let mut line = &self.buf[line_start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        self.buf.drain(..start);
        self.scanned = self.buf.len();
        if self.buf.len() > self.max_line {
            warn!(len = self.buf.len(), max = self.max_line, "Dropping oversized SSE line");
            self.buf.clear();
            self.scanned = 0;
            self.discarding = true;
        }

        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            other => trace!(field = other, "Ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event,
            id: self.id.clone(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Decode a streaming HTTP response body into events.
pub fn event_stream(response: reqwest::Response) -> EventStream {
    let mut decoder = SseDecoder::new();
    let events = response
        .bytes_stream()
        .map(move |chunk| match chunk {
            Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
            Err(e) => vec![Err(e).context("SSE stream interrupted")],
        })
        .flat_map(stream::iter);
    Box::pin(events)
}
