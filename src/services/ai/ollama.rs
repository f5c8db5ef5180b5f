// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Self-hosted Ollama backend (`/api/chat`).

use super::{
    body_stream, check_status, malformed, transport_error, AiError, AiProvider, ByteStream,
    ProviderKind,
};
use crate::config::ProviderConfig;
use crate::models::ChatMessage;
use crate::services::relay::{LineOutcome, StreamEnd, StreamFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const KIND: ProviderKind = ProviderKind::Local;

pub struct OllamaProvider {
    http: reqwest::Client,
    config: ProviderConfig,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(http: reqwest::Client, config: ProviderConfig, timeout: Duration) -> Self {
        Self {
            http,
            config,
            timeout,
        }
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/api/chat", self.config.base_url))
            .json(&ChatRequest {
                model: &self.config.model,
                messages,
                stream,
            })
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.config.enabled && !self.config.base_url.is_empty()
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::OllamaNdjson
    }

    async fn get_response(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let response = self
            .request(messages, false)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;

        let reply: ChatChunk = check_status(KIND, response)
            .await?
            .json()
            .await
            .map_err(|e| malformed(KIND, e.to_string()))?;

        if let Some(error) = reply.error {
            return Err(malformed(KIND, error));
        }

        reply
            .message
            .map(|m| m.content)
            .ok_or_else(|| malformed(KIND, "reply has no message"))
    }

    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ByteStream, AiError> {
        let response = self
            .request(messages, true)
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;

        let response = check_status(KIND, response).await?;
        Ok(body_stream(KIND, response))
    }
}

/// Ollama accepts our message shape unchanged.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Both the full reply and each streamed NDJSON line.
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Decode one NDJSON line.
pub fn decode_stream_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::skip();
    }

    match serde_json::from_str::<ChatChunk>(line) {
        Ok(ChatChunk {
            error: Some(error), ..
        }) => LineOutcome::failed(error),
        Ok(chunk) => {
            let text = chunk.message.map(|m| m.content).unwrap_or_default();
            LineOutcome::content(text).with_end(chunk.done.then_some(StreamEnd::Done))
        }
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable Ollama stream line");
            LineOutcome::skip()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ndjson_lines() {
        let line = r#"{"model":"llama3.2","created_at":"2024-01-01T00:00:00Z","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(decode_stream_line(line), LineOutcome::content("Hel"));

        let last = r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"total_duration":1}"#;
        assert_eq!(decode_stream_line(last), LineOutcome::done());

        assert_eq!(decode_stream_line("   "), LineOutcome::skip());
        assert_eq!(decode_stream_line("{\"message\":"), LineOutcome::skip());
        assert_eq!(
            decode_stream_line(r#"{"error":"model not found"}"#),
            LineOutcome::failed("model not found")
        );
    }

    #[test]
    fn test_request_uses_chat_message_shape() {
        let messages = [ChatMessage::system("s"), ChatMessage::user("u")];
        let body = ChatRequest {
            model: "llama3.2",
            messages: &messages,
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "u");
        assert_eq!(value["stream"], false);
    }
}
