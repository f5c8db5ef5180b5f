// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Penpal API: sign-in token exchange and AI letter-writing proxy
//!
//! This crate provides a stateless backend that swaps Google or Apple
//! identity tokens for short-lived access tokens, and relays chat requests
//! to hosted or self-hosted AI models.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use anyhow::Context;
use config::Config;
use middleware::rate_limit::RateLimiter;
use models::IdentityProvider;
use services::{AccessTokenService, IdentityVerifier, ProviderRegistry, RemoteKeyCache};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub google_verifier: IdentityVerifier,
    pub apple_verifier: IdentityVerifier,
    pub access_tokens: AccessTokenService,
    pub ai_providers: ProviderRegistry,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Build every service from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let access_tokens = AccessTokenService::from_config(&config)
            .context("failed to load access token signing key")?;
        let ai_providers = ProviderRegistry::from_config(&config)?;
        Self::with_services(config, access_tokens, ai_providers)
    }

    /// Build state around an already constructed token service and AI
    /// registry; the identity verifiers and rate limiter come from `config`.
    pub fn with_services(
        config: Config,
        access_tokens: AccessTokenService,
        ai_providers: ProviderRegistry,
    ) -> anyhow::Result<Self> {
        let key_cache = Arc::new(RemoteKeyCache::new(
            config.jwks_cache_ttl,
            config.jwks_refresh_cooldown,
        )?);

        Ok(Self {
            google_verifier: IdentityVerifier::google(&config, key_cache.clone()),
            apple_verifier: IdentityVerifier::apple(&config, key_cache),
            access_tokens,
            ai_providers,
            rate_limiter: RateLimiter::new(
                config.rate_limit_window,
                config.rate_limit_max_requests,
            ),
            config,
        })
    }

    pub fn verifier(&self, provider: IdentityProvider) -> &IdentityVerifier {
        match provider {
            IdentityProvider::Google => &self.google_verifier,
            IdentityProvider::Apple => &self.apple_verifier,
        }
    }
}
