// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OpenAI-compatible Chat Completions backend.

use super::{
    body_stream, check_status, malformed, transport_error, AiError, AiProvider, ByteStream,
    ProviderKind,
};
use crate::config::ProviderConfig;
use crate::models::ChatMessage;
use crate::services::relay::{sse_data, LineOutcome, StreamEnd, StreamFormat};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const KIND: ProviderKind = ProviderKind::OpenAi;
const DONE_SENTINEL: &str = "[DONE]";

pub struct OpenAiProvider {
    http: reqwest::Client,
    config: ProviderConfig,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(http: reqwest::Client, config: ProviderConfig, timeout: Duration) -> Self {
        Self {
            http,
            config,
            timeout,
        }
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream,
        };

        self.http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&body)
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
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
        StreamFormat::OpenAiSse
    }

    async fn get_response(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let response = self
            .request(messages, false)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(KIND, e))?;

        let completion: CompletionResponse = check_status(KIND, response)
            .await?
            .json()
            .await
            .map_err(|e| malformed(KIND, e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| malformed(KIND, "no choices in completion"))
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
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// One `data:` payload of a streamed completion.
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamPayload {
    Error { error: StreamError },
    Chunk { choices: Vec<StreamChoice> },
}

#[derive(Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one line of a Chat Completions event stream.
pub fn decode_stream_line(line: &str) -> LineOutcome {
    let Some(data) = sse_data(line) else {
        return LineOutcome::skip();
    };

    if data == DONE_SENTINEL {
        return LineOutcome::done();
    }

    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload::Chunk { choices }) => {
            let Some(choice) = choices.into_iter().next() else {
                return LineOutcome::skip();
            };
            let text = choice.delta.and_then(|d| d.content).unwrap_or_default();
            let end = choice.finish_reason.map(|_| StreamEnd::Done);
            LineOutcome::content(text).with_end(end)
        }
        Ok(StreamPayload::Error { error }) => LineOutcome::failed(error.message),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable OpenAI stream line");
            LineOutcome::skip()
        }
    }
}
