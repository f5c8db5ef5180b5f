// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared cache of remote JWKS key sets for external identity issuers.
//!
//! Entries are keyed by JWKS URL and replaced wholesale after a successful
//! fetch. No lock is held across the network call: concurrent lookups keep
//! reading the previous entry, and two tasks refreshing the same URL at
//! once simply both store a fresh set.

use crate::models::{Jwk, JwkSet};
use anyhow::Context;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Key set fetch errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyCacheError {
    #[error("failed to fetch key set from {url}: {reason}")]
    FetchFailed { url: String, reason: String },
}

/// One usable verification key.
pub struct VerificationKey {
    pub algorithm: Algorithm,
    pub decoding_key: DecodingKey,
}

/// Verification keys of one issuer, indexed by `kid`.
#[derive(Default)]
pub struct KeySet {
    keys_by_kid: HashMap<String, Arc<VerificationKey>>,
}

impl KeySet {
    /// Build from a JWKS document, skipping keys we cannot use.
    pub fn from_jwks(jwks: JwkSet) -> Self {
        let mut keys_by_kid = HashMap::new();

        for jwk in jwks.keys {
            let Some(kid) = jwk.kid.clone().filter(|kid| !kid.trim().is_empty()) else {
                continue;
            };

            if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
                continue;
            }

            match verification_key(&jwk) {
                Ok(Some(key)) => {
                    keys_by_kid.insert(kid, Arc::new(key));
                }
                Ok(None) => {
                    tracing::warn!(kid = %kid, kty = %jwk.kty, alg = ?jwk.alg, "Skipping unsupported JWKS key");
                }
                Err(e) => {
                    tracing::warn!(error = %e, kid = %kid, "Skipping invalid JWKS key");
                }
            }
        }

        Self { keys_by_kid }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<VerificationKey>> {
        self.keys_by_kid.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys_by_kid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys_by_kid.is_empty()
    }
}

/// Convert a JWK; `Ok(None)` for key types or algorithms we do not accept.
fn verification_key(jwk: &Jwk) -> jsonwebtoken::errors::Result<Option<VerificationKey>> {
    match (jwk.kty.as_str(), jwk.alg.as_deref()) {
        ("RSA", None | Some("RS256")) => {
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                return Ok(None);
            };
            Ok(Some(VerificationKey {
                algorithm: Algorithm::RS256,
                decoding_key: DecodingKey::from_rsa_components(n, e)?,
            }))
        }
        ("EC", None | Some("ES256")) if jwk.crv.as_deref() == Some("P-256") => {
            let (Some(x), Some(y)) = (&jwk.x, &jwk.y) else {
                return Ok(None);
            };
            Ok(Some(VerificationKey {
                algorithm: Algorithm::ES256,
                decoding_key: DecodingKey::from_ec_components(x, y)?,
            }))
        }
        _ => Ok(None),
    }
}

#[derive(Clone)]
struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

/// TTL cache of issuer key sets with a per-URL refresh cooldown.
pub struct RemoteKeyCache {
    http_client: reqwest::Client,
    ttl: Duration,
    cooldown: Duration,
    entries: DashMap<String, CachedKeySet>,
    last_attempts: DashMap<String, Instant>,
    last_failures: DashMap<String, Instant>,
}

fn recently(stamps: &DashMap<String, Instant>, url: &str, window: Duration) -> bool {
    stamps.get(url).is_some_and(|at| at.elapsed() < window)
}

impl RemoteKeyCache {
    pub fn new(ttl: Duration, cooldown: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building JWKS HTTP client")?;

        Ok(Self {
            http_client,
            ttl,
            cooldown,
            entries: DashMap::new(),
            last_attempts: DashMap::new(),
            last_failures: DashMap::new(),
        })
    }

    /// Key set for `url`, fetched on miss or after the TTL.
    ///
    /// A fresh entry is returned as the same `Arc` without network I/O. If
    /// the fetch fails and an older set exists, the older set is served.
    pub async fn get_key_set(&self, url: &str) -> Result<Arc<KeySet>, KeyCacheError> {
        self.load(url, false).await
    }

    /// Refetch regardless of TTL, e.g. after an unknown `kid`.
    ///
    /// Attempts within the cooldown of the previous one return the current
    /// entry instead of hitting the issuer again.
    pub async fn refresh(&self, url: &str) -> Result<Arc<KeySet>, KeyCacheError> {
        self.load(url, true).await
    }

    async fn load(&self, url: &str, force: bool) -> Result<Arc<KeySet>, KeyCacheError> {
        let current = self.entries.get(url).map(|entry| entry.value().clone());

        if let Some(entry) = &current {
            if !force && entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.keys.clone());
            }
        }

        // With an entry to serve, any recent attempt defers the refetch.
        // Without one, only a recent failure does: callers racing a cold
        // fetch that is still in flight must fetch too.
        match &current {
            Some(entry) if recently(&self.last_attempts, url, self.cooldown) => {
                return Ok(entry.keys.clone());
            }
            None if recently(&self.last_failures, url, self.cooldown) => {
                return Err(KeyCacheError::FetchFailed {
                    url: url.to_string(),
                    reason: "previous fetch failed; refresh cooldown active".to_string(),
                });
            }
            _ => {}
        }

        self.last_attempts.insert(url.to_string(), Instant::now());

        match self.fetch(url).await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                self.entries.insert(
                    url.to_string(),
                    CachedKeySet {
                        keys: keys.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                self.last_failures.remove(url);
                tracing::debug!(url = %url, keys = keys.len(), "JWKS cache refreshed");
                Ok(keys)
            }
            Err(e) => {
                self.last_failures.insert(url.to_string(), Instant::now());
                match current {
                    Some(entry) => {
                        tracing::warn!(error = %e, "JWKS refresh failed; serving stale key set");
                        Ok(entry.keys)
                    }
                    None => {
                        tracing::error!(error = %e, "JWKS fetch failed with no cached key set");
                        Err(e)
                    }
                }
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<KeySet, KeyCacheError> {
        let failed = |reason: String| KeyCacheError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(failed(format!("returned status {}", response.status())));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| failed(format!("invalid JWKS JSON: {e}")))?;

        let keys = KeySet::from_jwks(jwks);
        if keys.is_empty() {
            return Err(failed("no usable signing keys".to_string()));
        }

        Ok(keys)
    }
}
