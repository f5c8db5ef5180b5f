// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in token exchange routes.

use axum::{extract::State, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::error::{AppError, Result};
use crate::models::IdentityProvider;
use crate::routes::ValidatedJson;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/auth/exchange", post(exchange))
        .route("/v1/auth/providers", get(providers))
}

/// Body of `POST /v1/auth/exchange`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub provider: IdentityProvider,
    #[validate(custom(function = "validate_token"))]
    pub id_token: String,
}

fn validate_token(token: &str) -> std::result::Result<(), ValidationError> {
    if token.trim().is_empty() {
        let mut err = ValidationError::new("empty_token");
        err.message = Some("idToken must not be empty".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeResponse {
    pub token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
    pub provider: IdentityProvider,
}

/// Swap a verified Google or Apple identity token for an access token.
async fn exchange(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<ExchangeRequest>,
) -> Result<Json<ExchangeResponse>> {
    let verifier = state.verifier(req.provider);
    if !verifier.is_configured() {
        return Err(AppError::ProviderNotConfigured(req.provider));
    }

    let identity = verifier.verify(&req.id_token).await?;
    let token = state.access_tokens.sign(&identity.user_id, req.provider)?;

    tracing::info!(
        provider = %req.provider,
        user_id = %identity.user_id,
        "Issued access token"
    );

    Ok(Json(ExchangeResponse {
        token,
        expires_in: state.access_tokens.expires_in().as_secs(),
        provider: req.provider,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthProvidersResponse {
    pub google: ProviderStatus,
    pub apple: ProviderStatus,
}

/// Which sign-in providers this deployment accepts.
async fn providers(State(state): State<Arc<AppState>>) -> Json<AuthProvidersResponse> {
    Json(AuthProvidersResponse {
        google: ProviderStatus {
            enabled: state.google_verifier.is_configured(),
        },
        apple: ProviderStatus {
            enabled: state.apple_verifier.is_configured(),
        },
    })
}
