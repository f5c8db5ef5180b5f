// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Anthropic Messages API backend.
//!
//! The Messages API has no `system` role. The first system message becomes
//! the top-level `system` field; any later system messages are sent as
//! ordinary user turns.

use super::{
    body_stream, check_status, malformed, transport_error, AiError, AiProvider, ByteStream,
    ProviderKind,
};
use crate::config::ProviderConfig;
use crate::models::{ChatMessage, Role};
use crate::services::relay::{sse_data, LineOutcome, StreamFormat};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const KIND: ProviderKind = ProviderKind::Anthropic;
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    http: reqwest::Client,
    config: ProviderConfig,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicProvider {
    pub fn new(
        http: reqwest::Client,
        config: ProviderConfig,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            config,
            max_tokens,
            timeout,
        }
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let (system, messages) = split_system(messages);
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.max_tokens,
            system,
            messages,
            stream,
        };

        self.http
            .post(format!("{}/messages", self.config.base_url))
            .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", API_VERSION)
            .json(&body)
    }
}

/// Promote the first system message; demote the rest to user turns.
fn split_system(messages: &[ChatMessage]) -> (Option<&str>, Vec<WireMessage<'_>>) {
    let mut system = None;
    let mut turns = Vec::with_capacity(messages.len());

    for message in messages {
        let role = match message.role {
            Role::System if system.is_none() => {
                system = Some(message.content.as_str());
                continue;
            }
            Role::System | Role::User => "user",
            Role::Assistant => "assistant",
        };
        turns.push(WireMessage {
            role,
            content: &message.content,
        });
    }

    (system, turns)
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.config.enabled && self.config.api_key.is_some()
    }

    fn stream_format(&self) -> StreamFormat {
        StreamFormat::AnthropicSse
    }

    async fn get_response(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let response = self
            .request(messages, false)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;

        let reply: MessagesResponse = check_status(KIND, response)
            .await?
            .json()
            .await
            .map_err(|e| malformed(KIND, e.to_string()))?;

        let text: String = reply
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        if text.is_empty() {
            return Err(malformed(KIND, "no text content in reply"));
        }
        Ok(text)
    }

    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ByteStream, AiError> {
        let response = self
            .request(messages, true)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;

        let response = check_status(KIND, response).await?;
        Ok(body_stream(KIND, response))
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// `data:` payloads of the Messages event stream.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

/// Decode one line of a Messages event stream.
///
/// `event:` lines are redundant with the `type` field of the data payload
/// and are skipped.
pub fn decode_stream_line(line: &str) -> LineOutcome {
    let Some(data) = sse_data(line) else {
        return LineOutcome::skip();
    };

    match serde_json::from_str::<StreamEvent>(data) {
        Ok(StreamEvent::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        }) => LineOutcome::content(text),
        Ok(StreamEvent::MessageStop) => LineOutcome::done(),
        Ok(StreamEvent::Error { error }) => LineOutcome::failed(error.message),
        Ok(_) => LineOutcome::skip(),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable Anthropic stream line");
            LineOutcome::skip()
        }
    }
}
