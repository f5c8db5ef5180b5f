// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Streaming relay: provider byte streams in, normalized events out.
//!
//! Upstream bodies are either `data:` Server-Sent-Event lines or
//! newline-delimited JSON. Bytes are buffered until a full line is
//! available, so chunk boundaries never matter. Every relay stream ends
//! with exactly one terminal event ([`RelayEvent::Done`] or
//! [`RelayEvent::Error`]) unless the consumer drops it first.

use crate::services::ai::{anthropic, ollama, openai, ByteStream};
use async_stream::stream;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

/// Normalized stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A content fragment, in upstream order.
    Chunk(String),
    /// Normal end of stream.
    Done,
    /// Abnormal end of stream; the message is safe to show to clients.
    Error(String),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Chunk(_))
    }
}

pub type RelayStream = BoxStream<'static, RelayEvent>;

/// Native streaming wire formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// `data: {chat.completion.chunk}` lines ending with `data: [DONE]`.
    OpenAiSse,
    /// Anthropic Messages API event stream.
    AnthropicSse,
    /// Ollama `/api/chat` NDJSON.
    OllamaNdjson,
}

impl StreamFormat {
    pub fn decode_line(&self, line: &str) -> LineOutcome {
        match self {
            StreamFormat::OpenAiSse => openai::decode_stream_line(line),
            StreamFormat::AnthropicSse => anthropic::decode_stream_line(line),
            StreamFormat::OllamaNdjson => ollama::decode_stream_line(line),
        }
    }
}

/// How a stream ends, as signalled in-band by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Done,
    Failed(String),
}

/// Result of decoding one complete line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineOutcome {
    pub content: Option<String>,
    pub end: Option<StreamEnd>,
}

impl LineOutcome {
    pub fn skip() -> Self {
        Self::default()
    }

    pub fn content(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            content: (!text.is_empty()).then_some(text),
            end: None,
        }
    }

    pub fn done() -> Self {
        Self {
            content: None,
            end: Some(StreamEnd::Done),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            content: None,
            end: Some(StreamEnd::Failed(reason.into())),
        }
    }

    pub fn with_end(mut self, end: Option<StreamEnd>) -> Self {
        self.end = end;
        self
    }
}

/// Payload of an SSE `data:` line, or `None` for other SSE fields.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).trim_end())
}

/// Longest upstream line we are willing to buffer.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// An upstream line outgrew the buffer limit before its `\n` arrived.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stream line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Splits an arbitrary byte sequence into `\n`-terminated lines.
///
/// Bytes are kept until their line is complete; multi-byte UTF-8 sequences
/// split across chunks are reassembled intact. A trailing `\r` is dropped.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn with_limit(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
        }
    }

    /// Append bytes and return every line they complete.
    ///
    /// Fails once the unterminated tail is longer than the limit.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, LineTooLong> {
        let searched = self.pending.len();
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        for (offset, byte) in self.pending[searched..].iter().enumerate() {
            if *byte == b'\n' {
                let end = searched + offset;
                lines.push(decode_line(&self.pending[start..end]));
                start = end + 1;
            }
        }
        self.pending.drain(..start);

        if self.pending.len() > self.max_line {
            self.pending.clear();
            return Err(LineTooLong {
                limit: self.max_line,
            });
        }
        Ok(lines)
    }

    /// Flush an unterminated final line.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Logs when the consumer goes away before a terminal event.
struct DisconnectGuard {
    format: StreamFormat,
    finished: bool,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(format = ?self.format, "Client disconnected; upstream stream dropped");
        }
    }
}

/// Relay an upstream body as normalized events.
///
/// Lines that fail to decode are skipped. Upstream EOF without an explicit
/// terminator counts as [`RelayEvent::Done`]. Dropping the returned stream
/// drops the upstream body, which stops reading from the provider.
pub fn relay(upstream: ByteStream, format: StreamFormat) -> RelayStream {
    relay_with_buffer(upstream, format, LineBuffer::default())
}

fn relay_with_buffer(
    mut upstream: ByteStream,
    format: StreamFormat,
    mut buffer: LineBuffer,
) -> RelayStream {
    Box::pin(stream! {
        let mut guard = DisconnectGuard { format, finished: false };

        'relay: loop {
            let (lines, eof) = match upstream.next().await {
                Some(Ok(bytes)) => match buffer.push(&bytes) {
                    Ok(lines) => (lines, false),
                    Err(e) => {
                        tracing::error!(error = %e, "AI provider stream line too long");
                        guard.finished = true;
                        yield RelayEvent::Error("AI provider stream line too long".to_string());
                        break 'relay;
                    }
                },
                Some(Err(e)) => {
                    tracing::error!(error = %e, "AI provider stream interrupted");
                    guard.finished = true;
                    yield RelayEvent::Error("AI provider stream interrupted".to_string());
                    break 'relay;
                }
                None => (buffer.finish().into_iter().collect(), true),
            };

            for line in lines {
                let outcome = format.decode_line(&line);
                if let Some(content) = outcome.content {
                    yield RelayEvent::Chunk(content);
                }
                match outcome.end {
                    Some(StreamEnd::Done) => {
                        guard.finished = true;
                        yield RelayEvent::Done;
                        break 'relay;
                    }
                    Some(StreamEnd::Failed(reason)) => {
                        tracing::error!(reason = %reason, "AI provider reported a stream error");
                        guard.finished = true;
                        yield RelayEvent::Error("AI provider reported an error".to_string());
                        break 'relay;
                    }
                    None => {}
                }
            }

            if eof {
                guard.finished = true;
                yield RelayEvent::Done;
                break 'relay;
            }
        }
    })
}
