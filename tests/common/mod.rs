// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use penpal_api::config::{Config, ProviderConfig};
use penpal_api::routes::create_router;
use penpal_api::AppState;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const IDENTITY_KEY_PEM: &[u8] = include_bytes!("../fixtures/identity_rsa.pem");
pub const OTHER_KEY_PEM: &[u8] = include_bytes!("../fixtures/other_rsa.pem");
pub const IDENTITY_KID: &str = "identity-key-1";

const IDENTITY_KEY_N: &str = "zlYl_ngMedpmbGp9C4Kg-YvFld2hUDn0FpmEKEdsdzDkDN9Aljle-4aDxetNJ1vqRQs41gkmFm_TFzPmYWEORvegDfqhradE_WZ3Z3aM7avDqEBnoDoycwuxfOCbzX8zyzu_ibj4lX_bjLtFSOxrmMvRNRqh8NhnmCFAQOh0DzTKiEhz3kkl-UXB8Jkpw9LG-Xsktlf9gDupLl_Pm-_FmDHMXva1z9Oof6_avlFJm7fh6f2wS1c3PjzPUT1O_dRavbEcrBXNaGsqvmDjTazdBNZcfTCrnsXJ-_TlyLRDd_VakwE-bbWjIGEAWTZKYsNGO8Vo3HjkYfqFQKZ2oUf1hQ";

pub const GOOGLE_AUDIENCE: &str = "google-ios.apps.test";
pub const APPLE_AUDIENCE: &str = "com.example.penpal";

/// Serve `router` on an ephemeral local port and return its base URL.
#[allow(dead_code)]
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// JWK for the identity fixture key under `kid`.
#[allow(dead_code)]
pub fn identity_jwk(kid: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "alg": "RS256",
        "use": "sig",
        "n": IDENTITY_KEY_N,
        "e": "AQAB",
    })
}

/// Stand-in for a provider's JWKS endpoint.
#[derive(Clone)]
pub struct MockJwks {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
    pub fail: Arc<AtomicBool>,
    pub keys: Arc<Mutex<Value>>,
    pub delay_ms: Arc<AtomicU64>,
}

#[allow(dead_code)]
impl MockJwks {
    pub async fn start() -> Self {
        Self::start_with(json!({ "keys": [identity_jwk(IDENTITY_KID)] })).await
    }

    pub async fn start_with(keys: Value) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        let keys = Arc::new(Mutex::new(keys));
        let delay_ms = Arc::new(AtomicU64::new(0));

        let mock = (hits.clone(), fail.clone(), keys.clone(), delay_ms.clone());
        let router = Router::new()
            .route("/jwks", get(serve_jwks))
            .with_state(mock);

        let base = spawn_server(router).await;
        Self {
            url: format!("{base}/jwks"),
            hits,
            fail,
            keys,
            delay_ms,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn set_keys(&self, keys: Value) {
        *self.keys.lock().unwrap() = keys;
    }

    /// Hold every response for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

type JwksState = (
    Arc<AtomicUsize>,
    Arc<AtomicBool>,
    Arc<Mutex<Value>>,
    Arc<AtomicU64>,
);

async fn serve_jwks(State((hits, fail, keys, delay_ms)): State<JwksState>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    let delay = delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if fail.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))).into_response();
    }
    let body = keys.lock().unwrap().clone();
    Json(body).into_response()
}

/// Stand-in for AI backends.
///
/// `{url}` speaks the Ollama chat API, `{url}/v1` the OpenAI Chat
/// Completions API and `{url}/anthropic/v1` the Anthropic Messages API.
/// `{url}/broken` fails every request; `{url}/erroring` streams one chunk
/// and then an in-band error.
#[derive(Clone)]
pub struct MockAi {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
}

pub const MOCK_REPLY: &str = "Dear friend, thank you for your letter.";

#[allow(dead_code)]
impl MockAi {
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/api/chat", post(ollama_chat))
            .route("/v1/chat/completions", post(openai_chat))
            .route("/anthropic/v1/messages", post(anthropic_messages))
            .route("/broken/api/chat", post(broken))
            .route("/erroring/api/chat", post(erroring_chat))
            .with_state(hits.clone());

        Self {
            url: spawn_server(router).await,
            hits,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn local_provider(&self) -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            model: "llama3.2".to_string(),
            base_url: self.url.clone(),
            api_key: None,
        }
    }

    pub fn openai_provider(&self) -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            model: "gpt-4o-mini".to_string(),
            base_url: format!("{}/v1", self.url),
            api_key: Some("sk-test".to_string()),
        }
    }

    pub fn anthropic_provider(&self) -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            model: "claude-3-5-haiku-latest".to_string(),
            base_url: format!("{}/anthropic/v1", self.url),
            api_key: Some(ANTHROPIC_KEY.to_string()),
        }
    }

    pub fn broken_provider(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: format!("{}/broken", self.url),
            ..self.local_provider()
        }
    }

    pub fn erroring_provider(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: format!("{}/erroring", self.url),
            ..self.local_provider()
        }
    }
}

const ANTHROPIC_KEY: &str = "sk-ant-test";

/// System prompt every mock Anthropic request must carry at top level.
pub const MOCK_SYSTEM_PROMPT: &str = "You are a warm, curious pen pal.";

async fn ollama_chat(State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);

    if body["stream"] == json!(true) {
        let lines = [
            json!({"message": {"role": "assistant", "content": "Dear friend, "}, "done": false}),
            json!({"message": {"role": "assistant", "content": "thank you for your letter."}, "done": false}),
            json!({"message": {"role": "assistant", "content": ""}, "done": true}),
        ];
        let ndjson: String = lines.iter().map(|l| format!("{l}\n")).collect();
        return ([(header::CONTENT_TYPE, "application/x-ndjson")], ndjson).into_response();
    }

    Json(json!({
        "model": body["model"],
        "message": {"role": "assistant", "content": MOCK_REPLY},
        "done": true,
    }))
    .into_response()
}

async fn openai_chat(
    State(hits): State<Arc<AtomicUsize>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);

    if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"message": "bad key"}})))
            .into_response();
    }

    if body["stream"] == json!(true) {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Dear friend, \"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"thank you for your letter.\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        return ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response();
    }

    Json(json!({
        "id": "chatcmpl-test",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": MOCK_REPLY}, "finish_reason": "stop"}],
    }))
    .into_response()
}

async fn anthropic_messages(
    State(hits): State<Arc<AtomicUsize>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);

    let header_value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    if header_value("x-api-key") != Some(ANTHROPIC_KEY)
        || header_value("anthropic-version") != Some("2023-06-01")
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({"type": "error", "error": {"message": "bad headers"}})))
            .into_response();
    }

    // The Messages API rejects a `system` role inside `messages`.
    let roles_ok = body["messages"]
        .as_array()
        .is_some_and(|messages| messages.iter().all(|m| m["role"] == "user" || m["role"] == "assistant"));
    if body["system"] != MOCK_SYSTEM_PROMPT || !roles_ok || body["max_tokens"].as_u64().is_none() {
        return (StatusCode::BAD_REQUEST, Json(json!({"type": "error", "error": {"message": "bad body"}})))
            .into_response();
    }

    if body["stream"] == json!(true) {
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_test\",\"content\":[]}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Dear friend, \"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"thank you for your letter.\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        return ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response();
    }

    Json(json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [
            {"type": "text", "text": "Dear friend, "},
            {"type": "tool_use", "id": "toolu_1", "name": "noop", "input": {}},
            {"type": "text", "text": "thank you for your letter."},
        ],
        "stop_reason": "end_turn",
    }))
    .into_response()
}

async fn erroring_chat(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    let ndjson = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"Dear friend, \"},\"done\":false}\n",
        "{\"error\":\"model ran out of memory: secret internal detail\"}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"never sent\"},\"done\":false}\n",
    );
    ([(header::CONTENT_TYPE, "application/x-ndjson")], ndjson)
}

async fn broken(State(hits): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "model crashed: secret internal detail")
}

/// Fresh P-256 signing key as bare base64 PKCS#8 DER.
#[allow(dead_code)]
pub fn generated_signing_key() -> String {
    let der = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &SystemRandom::new())
        .unwrap();
    STANDARD.encode(der.as_ref())
}

/// Router, state and the mock upstreams behind them.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub jwks: MockJwks,
    pub ai: MockAi,
}

#[allow(dead_code)]
impl TestApp {
    /// Access token for a signed-in user.
    pub fn access_token(&self, sub: &str) -> String {
        self.state
            .access_tokens
            .sign(sub, penpal_api::models::IdentityProvider::Google)
            .unwrap()
    }
}

/// Create a test app wired to local mock upstreams.
///
/// Both identity providers share one mock JWKS endpoint; the local AI
/// backend is enabled and points at the mock AI server.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    create_test_app_with(|_, _| {}).await
}

#[allow(dead_code)]
pub async fn create_test_app_with(customize: impl FnOnce(&mut Config, &MockAi)) -> TestApp {
    let jwks = MockJwks::start().await;
    let ai = MockAi::start().await;

    let mut config = Config::test_default();
    config.access_token_private_key = generated_signing_key();
    config.google_jwks_url = jwks.url.clone();
    config.apple_jwks_url = jwks.url.clone();
    config.ollama = ai.local_provider();
    customize(&mut config, &ai);

    let state = Arc::new(AppState::from_config(config).unwrap());
    TestApp {
        router: create_router(state.clone()),
        state,
        jwks,
        ai,
    }
}

/// Google identity token claims for `sub`.
#[allow(dead_code)]
pub fn google_claims(sub: &str) -> Value {
    let now = get_current_timestamp();
    json!({
        "iss": "https://accounts.google.com",
        "aud": GOOGLE_AUDIENCE,
        "sub": sub,
        "iat": now,
        "exp": now + 600,
        "email": "pat@example.com",
        "email_verified": true,
        "name": "Pat Penpal",
    })
}

/// Apple identity token claims for `sub`.
#[allow(dead_code)]
pub fn apple_claims(sub: &str) -> Value {
    let now = get_current_timestamp();
    json!({
        "iss": "https://appleid.apple.com",
        "aud": APPLE_AUDIENCE,
        "sub": sub,
        "iat": now,
        "exp": now + 600,
        "email": "relay@privaterelay.appleid.com",
        "email_verified": "true",
    })
}

/// RS256 identity token signed by the fixture key.
#[allow(dead_code)]
pub fn identity_token(claims: &Value) -> String {
    sign_identity_token(IDENTITY_KEY_PEM, IDENTITY_KID, claims)
}

#[allow(dead_code)]
pub fn sign_identity_token(pem: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[allow(dead_code)]
pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
