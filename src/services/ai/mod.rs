// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI backends behind one chat interface.
//!
//! Each backend translates [`ChatMessage`]s into its own wire schema and
//! can answer either in one piece or as a byte stream that the relay turns
//! into normalized events.

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::config::Config;
use crate::models::ChatMessage;
use crate::services::relay::{self, RelayStream, StreamFormat};
use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw upstream response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, AiError>>;

/// Backend identifier, as accepted in the `provider` request field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "local")]
    Local,
}

impl ProviderKind {
    /// Selection order when the caller does not name a provider.
    pub const PRIORITY: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "local" => Ok(ProviderKind::Local),
            other => Err(format!("unknown AI provider: {other}")),
        }
    }
}

/// AI provider errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AiError {
    #[error("no AI provider is configured")]
    NoProviderConfigured,

    #[error("AI provider {0} is not configured")]
    ProviderUnavailable(ProviderKind),

    #[error("{provider} returned HTTP {status}")]
    Upstream { provider: ProviderKind, status: u16 },

    #[error("{provider} request failed: {reason}")]
    Transport {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider} returned a malformed response: {reason}")]
    MalformedResponse {
        provider: ProviderKind,
        reason: String,
    },
}

/// One AI backend.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    fn is_configured(&self) -> bool;

    /// Wire format of [`AiProvider::open_stream`] bodies.
    fn stream_format(&self) -> StreamFormat;

    /// Complete reply text.
    async fn get_response(&self, messages: &[ChatMessage]) -> Result<String, AiError>;

    /// Start a streaming completion and return the raw response body.
    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ByteStream, AiError>;

    /// Start a streaming completion as normalized relay events.
    async fn stream_response(&self, messages: &[ChatMessage]) -> Result<RelayStream, AiError> {
        let upstream = self.open_stream(messages).await?;
        Ok(relay::relay(upstream, self.stream_format()))
    }
}

/// All backends, in selection priority order.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn AiProvider>>,
}

impl ProviderRegistry {
    /// Providers are tried in the order given.
    pub fn new(providers: Vec<Arc<dyn AiProvider>>) -> Self {
        Self { providers }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed building AI provider HTTP client")?;

        let timeout = config.ai_request_timeout;
        let registry = Self::new(vec![
            Arc::new(OpenAiProvider::new(http.clone(), config.openai.clone(), timeout)),
            Arc::new(AnthropicProvider::new(
                http.clone(),
                config.anthropic.clone(),
                config.anthropic_max_tokens,
                timeout,
            )),
            Arc::new(OllamaProvider::new(http, config.ollama.clone(), timeout)),
        ]);

        for provider in registry.iter() {
            tracing::info!(
                provider = %provider.kind(),
                model = %provider.model(),
                enabled = provider.is_configured(),
                "AI provider registered"
            );
        }

        Ok(registry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AiProvider>> {
        self.providers.iter()
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn AiProvider>> {
        self.providers.iter().find(|p| p.kind() == kind)
    }

    /// First configured provider in priority order.
    pub fn default_provider(&self) -> Option<&Arc<dyn AiProvider>> {
        self.providers.iter().find(|p| p.is_configured())
    }

    /// Resolve the backend for a request.
    ///
    /// An explicit request bypasses the priority order but must still name
    /// a configured provider.
    pub fn select(&self, requested: Option<ProviderKind>) -> Result<Arc<dyn AiProvider>, AiError> {
        match requested {
            Some(kind) => self
                .get(kind)
                .filter(|p| p.is_configured())
                .cloned()
                .ok_or(AiError::ProviderUnavailable(kind)),
            None => self
                .default_provider()
                .cloned()
                .ok_or(AiError::NoProviderConfigured),
        }
    }
}

/// Map a non-2xx upstream response to [`AiError::Upstream`].
///
/// The body is logged for diagnosis and never returned to clients.
pub(crate) async fn check_status(
    provider: ProviderKind,
    response: reqwest::Response,
) -> Result<reqwest::Response, AiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(
        provider = %provider,
        status = %status,
        body = %body,
        "AI provider returned an error"
    );

    Err(AiError::Upstream {
        provider,
        status: status.as_u16(),
    })
}

pub(crate) fn transport_error(provider: ProviderKind, err: reqwest::Error) -> AiError {
    AiError::Transport {
        provider,
        reason: err.to_string(),
    }
}

pub(crate) fn malformed(provider: ProviderKind, reason: impl Into<String>) -> AiError {
    AiError::MalformedResponse {
        provider,
        reason: reason.into(),
    }
}

/// Response body as a [`ByteStream`].
pub(crate) fn body_stream(provider: ProviderKind, response: reqwest::Response) -> ByteStream {
    response
        .bytes_stream()
        .map_err(move |e| transport_error(provider, e))
        .boxed()
}
