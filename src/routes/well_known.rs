// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public key discovery.

use crate::models::JwkSet;
use crate::AppState;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/.well-known/jwks.json", get(jwks))
}

/// Public half of the access token signing key.
async fn jwks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let keys: JwkSet = state.access_tokens.jwks();
    ([(header::CACHE_CONTROL, "public, max-age=3600")], Json(keys))
}
