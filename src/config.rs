// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything is read once at startup and is immutable afterwards. Signing
//! key material arrives through the environment (Cloud Run secret bindings
//! inject secrets as env vars), so there is no separate secret loader.

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const DEFAULT_APPLE_JWKS_URL: &str = "https://appleid.apple.com/auth/keys";

/// Per-backend AI provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Whether the provider may be selected.
    pub enabled: bool,
    /// Model identifier sent upstream.
    pub model: String,
    /// API base URL, without trailing slash.
    pub base_url: String,
    /// API key for hosted providers.
    pub api_key: Option<String>,
}

impl ProviderConfig {
    fn hosted(api_key: Option<String>, model: String, base_url: String) -> Self {
        Self {
            enabled: api_key.is_some(),
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn local(base_url: Option<String>, model: String) -> Self {
        Self {
            enabled: base_url.is_some(),
            model,
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            api_key: None,
        }
    }

    /// Disabled provider with the given model name (tests and defaults).
    pub fn disabled(model: &str) -> Self {
        Self {
            enabled: false,
            model: model.to_string(),
            base_url: String::new(),
            api_key: None,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Server ---
    /// Server port
    pub port: u16,
    /// Origins allowed by CORS (localhost is always allowed)
    pub cors_origins: Vec<String>,

    // --- Access tokens ---
    /// P-256 private key, PKCS#8 PEM or base64 DER
    pub access_token_private_key: String,
    pub access_token_issuer: String,
    pub access_token_audience: String,
    /// Access token lifetime
    pub access_token_ttl: Duration,

    // --- External identity providers ---
    /// Accepted Google OAuth client IDs (iOS, Android, web)
    pub google_client_ids: Vec<String>,
    /// Accepted Apple audiences (bundle ID, services ID)
    pub apple_client_ids: Vec<String>,
    pub google_jwks_url: String,
    pub apple_jwks_url: String,
    pub jwks_cache_ttl: Duration,
    pub jwks_refresh_cooldown: Duration,

    // --- AI providers ---
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    /// Anthropic requires an explicit output ceiling
    pub anthropic_max_tokens: u32,
    pub ollama: ProviderConfig,
    /// Whole-request timeout for non-streaming provider calls
    pub ai_request_timeout: Duration,

    // --- Limits ---
    /// Ceiling on total user-submitted characters per request
    pub max_letter_length: usize,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: parse_or("PORT", 8080)?,
            cors_origins: list("CORS_ORIGINS"),

            access_token_private_key: env::var("ACCESS_TOKEN_PRIVATE_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("ACCESS_TOKEN_PRIVATE_KEY"))?,
            access_token_issuer: env::var("ACCESS_TOKEN_ISSUER")
                .unwrap_or_else(|_| "penpal-api".to_string()),
            access_token_audience: env::var("ACCESS_TOKEN_AUDIENCE")
                .unwrap_or_else(|_| "penpal-app".to_string()),
            access_token_ttl: Duration::from_secs(parse_or("ACCESS_TOKEN_TTL_SECS", 3600)?),

            google_client_ids: list("GOOGLE_CLIENT_IDS"),
            apple_client_ids: list("APPLE_CLIENT_IDS"),
            google_jwks_url: env::var("GOOGLE_JWKS_URL")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_JWKS_URL.to_string()),
            apple_jwks_url: env::var("APPLE_JWKS_URL")
                .unwrap_or_else(|_| DEFAULT_APPLE_JWKS_URL.to_string()),
            jwks_cache_ttl: Duration::from_secs(parse_or("JWKS_CACHE_TTL_SECS", 3600)?),
            jwks_refresh_cooldown: Duration::from_secs(parse_or(
                "JWKS_REFRESH_COOLDOWN_SECS",
                30,
            )?),

            openai: ProviderConfig::hosted(
                non_empty("OPENAI_API_KEY"),
                env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            ),
            anthropic: ProviderConfig::hosted(
                non_empty("ANTHROPIC_API_KEY"),
                env::var("ANTHROPIC_MODEL")
                    .unwrap_or_else(|_| "claude-3-5-haiku-latest".to_string()),
                env::var("ANTHROPIC_BASE_URL")
                    .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string()),
            ),
            anthropic_max_tokens: parse_or("ANTHROPIC_MAX_TOKENS", 1024)?,
            ollama: ProviderConfig::local(
                non_empty("OLLAMA_BASE_URL"),
                env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            ),
            ai_request_timeout: Duration::from_secs(parse_or("AI_REQUEST_TIMEOUT_SECS", 60)?),

            max_letter_length: parse_or("MAX_LETTER_LENGTH", 5000)?,
            rate_limit_window: Duration::from_secs(parse_or("RATE_LIMIT_WINDOW_SECS", 60)?),
            rate_limit_max_requests: parse_or("RATE_LIMIT_MAX_REQUESTS", 30)?,
        })
    }

    /// Deterministic configuration for tests.
    ///
    /// The private key is left empty; tests install a generated key.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            cors_origins: vec!["https://app.example.com".to_string()],
            access_token_private_key: String::new(),
            access_token_issuer: "penpal-api-test".to_string(),
            access_token_audience: "penpal-app-test".to_string(),
            access_token_ttl: Duration::from_secs(3600),
            google_client_ids: vec!["google-ios.apps.test".to_string()],
            apple_client_ids: vec!["com.example.penpal".to_string()],
            google_jwks_url: DEFAULT_GOOGLE_JWKS_URL.to_string(),
            apple_jwks_url: DEFAULT_APPLE_JWKS_URL.to_string(),
            jwks_cache_ttl: Duration::from_secs(3600),
            jwks_refresh_cooldown: Duration::from_secs(30),
            openai: ProviderConfig::disabled("gpt-4o-mini"),
            anthropic: ProviderConfig::disabled("claude-3-5-haiku-latest"),
            anthropic_max_tokens: 1024,
            ollama: ProviderConfig::disabled("llama3.2"),
            ai_request_timeout: Duration::from_secs(10),
            max_letter_length: 5000,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_requests: 100,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Comma-separated list, empty entries dropped.
fn list(name: &str) -> Vec<String> {
    env::var(name)
        .map(|v| parse_list(&v))
        .unwrap_or_default()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        _ => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
