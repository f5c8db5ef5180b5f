// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AI letter-writing routes (authenticated).

use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::chat::user_content_length;
use crate::models::ChatRequest;
use crate::routes::ValidatedJson;
use crate::services::{AiProvider, ProviderKind, RelayEvent};
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/ai/reply", post(reply))
        .route("/v1/ai/reply/stream", post(reply_stream))
        .route("/v1/ai/providers", get(providers))
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub reply: String,
    pub provider: ProviderKind,
}

/// Checks shared by both reply routes, in order: letter length, then
/// provider selection. Nothing reaches a provider if either fails.
fn prepare(state: &AppState, req: &ChatRequest) -> Result<Arc<dyn AiProvider>> {
    let max = state.config.max_letter_length;
    if user_content_length(&req.messages) > max {
        return Err(AppError::ContentTooLong { max });
    }

    let requested = req
        .provider
        .as_deref()
        .map(str::parse::<ProviderKind>)
        .transpose()
        .map_err(AppError::Validation)?;

    Ok(state.ai_providers.select(requested)?)
}

/// Generate a complete reply.
async fn reply(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChatRequest>,
) -> Result<Json<ReplyResponse>> {
    let provider = prepare(&state, &req)?;

    tracing::info!(
        user_id = %user.user_id,
        provider = %provider.kind(),
        messages = req.messages.len(),
        "Generating AI reply"
    );

    let reply = provider.get_response(&req.messages).await?;

    Ok(Json(ReplyResponse {
        reply,
        provider: provider.kind(),
    }))
}

fn sse_event(event: RelayEvent) -> Event {
    match event {
        RelayEvent::Chunk(content) => Event::default()
            .event("chunk")
            .data(json!({ "content": content }).to_string()),
        RelayEvent::Done => Event::default()
            .event("done")
            .data(json!({ "finished": true }).to_string()),
        RelayEvent::Error(error) => Event::default()
            .event("error")
            .data(json!({ "error": error }).to_string()),
    }
}

/// Generate a reply as Server-Sent Events.
///
/// Failures before the upstream stream opens are ordinary JSON errors;
/// after the `connected` event they are reported in-band.
async fn reply_stream(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let provider = prepare(&state, &req)?;
    let kind = provider.kind();

    tracing::info!(
        user_id = %user.user_id,
        provider = %kind,
        messages = req.messages.len(),
        "Streaming AI reply"
    );

    let events = provider.stream_response(&req.messages).await?;

    let connected = Event::default()
        .event("connected")
        .data(json!({ "provider": kind }).to_string());

    let body = stream::once(async move { connected })
        .chain(events.map(sse_event))
        .map(Ok);

    Ok(Sse::new(body).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub enabled: bool,
    pub model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiProvidersResponse {
    pub providers: BTreeMap<ProviderKind, ProviderInfo>,
    pub default: Option<ProviderKind>,
    pub max_letter_length: usize,
}

/// Backends available to the client and the letter length ceiling.
async fn providers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let providers = state
        .ai_providers
        .iter()
        .map(|p| {
            (
                p.kind(),
                ProviderInfo {
                    enabled: p.is_configured(),
                    model: p.model().to_string(),
                },
            )
        })
        .collect();

    Json(AiProvidersResponse {
        providers,
        default: state.ai_providers.default_provider().map(|p| p.kind()),
        max_letter_length: state.config.max_letter_length,
    })
}
