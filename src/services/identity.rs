// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google and Apple identity token verification.

use crate::config::Config;
use crate::models::{IdentityProvider, NormalizedIdentity};
use crate::services::key_cache::{KeyCacheError, RemoteKeyCache, VerificationKey};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use std::sync::Arc;

const GOOGLE_ISSUERS: &[&str] = &["https://accounts.google.com", "accounts.google.com"];
const APPLE_ISSUERS: &[&str] = &["https://appleid.apple.com"];
const CLOCK_SKEW_SECS: u64 = 60;

/// Identity token verification errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{0} sign-in is not configured")]
    ProviderNotConfigured(IdentityProvider),

    #[error("token verification failed: {0}")]
    TokenVerificationFailed(String),

    #[error("email address is not verified")]
    EmailNotVerified,

    #[error(transparent)]
    KeyFetchFailed(#[from] KeyCacheError),
}

/// `email_verified` as issued: Google sends a boolean, Apple a boolean or
/// a `"true"`/`"false"` string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmailVerified {
    Bool(bool),
    Text(String),
}

impl EmailVerified {
    /// Strings other than `"true"`/`"false"` normalize to unverified.
    fn normalized(&self) -> bool {
        match self {
            EmailVerified::Bool(verified) => *verified,
            EmailVerified::Text(text) => text == "true",
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<EmailVerified>,
    #[serde(default)]
    name: Option<String>,
}

/// Verifier for one external sign-in provider.
pub struct IdentityVerifier {
    provider: IdentityProvider,
    jwks_url: String,
    audiences: Vec<String>,
    key_cache: Arc<RemoteKeyCache>,
}

impl IdentityVerifier {
    pub fn new(
        provider: IdentityProvider,
        jwks_url: impl Into<String>,
        audiences: Vec<String>,
        key_cache: Arc<RemoteKeyCache>,
    ) -> Self {
        let verifier = Self {
            provider,
            jwks_url: jwks_url.into(),
            audiences,
            key_cache,
        };

        tracing::info!(
            provider = %provider,
            configured = verifier.is_configured(),
            audiences = verifier.audiences.len(),
            "Initialized identity verifier"
        );

        verifier
    }

    pub fn google(config: &Config, key_cache: Arc<RemoteKeyCache>) -> Self {
        Self::new(
            IdentityProvider::Google,
            config.google_jwks_url.clone(),
            config.google_client_ids.clone(),
            key_cache,
        )
    }

    pub fn apple(config: &Config, key_cache: Arc<RemoteKeyCache>) -> Self {
        Self::new(
            IdentityProvider::Apple,
            config.apple_jwks_url.clone(),
            config.apple_client_ids.clone(),
            key_cache,
        )
    }

    pub fn provider(&self) -> IdentityProvider {
        self.provider
    }

    /// A verifier without an audience allow-list accepts nothing.
    pub fn is_configured(&self) -> bool {
        !self.audiences.is_empty()
    }

    fn issuers(&self) -> &'static [&'static str] {
        match self.provider {
            IdentityProvider::Google => GOOGLE_ISSUERS,
            IdentityProvider::Apple => APPLE_ISSUERS,
        }
    }

    /// Verify an identity token and extract the user's identity.
    pub async fn verify(&self, token: &str) -> Result<NormalizedIdentity, IdentityError> {
        if !self.is_configured() {
            return Err(IdentityError::ProviderNotConfigured(self.provider));
        }

        let header = decode_header(token)
            .map_err(|e| failed(format!("invalid JWT header: {e}")))?;

        if !matches!(header.alg, Algorithm::RS256 | Algorithm::ES256) {
            return Err(failed(format!("unexpected JWT alg: {:?}", header.alg)));
        }

        let kid = header.kid.ok_or_else(|| failed("missing JWT kid"))?;

        let key = self.key_for_kid(&kid).await?;
        if key.algorithm != header.alg {
            return Err(failed(format!(
                "JWT alg {:?} does not match key {kid}",
                header.alg
            )));
        }

        let mut validation = Validation::new(key.algorithm);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.set_issuer(self.issuers());
        validation.set_audience(self.audiences.as_slice());
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<IdentityClaims>(token, &key.decoding_key, &validation)
            .map_err(|e| failed(format!("JWT validation failed: {e}")))?
            .claims;

        let user_id = claims
            .sub
            .filter(|sub| !sub.trim().is_empty())
            .ok_or_else(|| failed("missing subject claim"))?;

        let email = match claims.email {
            Some(email) => {
                if !self.email_verified(claims.email_verified.as_ref()) {
                    return Err(IdentityError::EmailNotVerified);
                }
                Some(email)
            }
            None => None,
        };

        tracing::debug!(
            provider = %self.provider,
            has_email = email.is_some(),
            "Identity token verified"
        );

        Ok(NormalizedIdentity {
            user_id,
            email,
            name: claims.name.filter(|name| !name.trim().is_empty()),
        })
    }

    fn email_verified(&self, claim: Option<&EmailVerified>) -> bool {
        match self.provider {
            IdentityProvider::Google => matches!(claim, Some(EmailVerified::Bool(true))),
            // Apple omits the claim for some relay addresses.
            IdentityProvider::Apple => claim.map_or(true, EmailVerified::normalized),
        }
    }

    async fn key_for_kid(&self, kid: &str) -> Result<Arc<VerificationKey>, IdentityError> {
        let keys = self.key_cache.get_key_set(&self.jwks_url).await?;
        if let Some(key) = keys.get(kid) {
            return Ok(key);
        }

        // Issuer may have rotated keys since our last fetch.
        let keys = self.key_cache.refresh(&self.jwks_url).await?;
        keys.get(kid).ok_or_else(|| failed(format!("JWT kid not found in JWKS: {kid}")))
    }
}

fn failed(reason: impl Into<String>) -> IdentityError {
    IdentityError::TokenVerificationFailed(reason.into())
}
