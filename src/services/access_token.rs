// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Self-issued access tokens.
//!
//! Tokens are ES256 JWTs signed with a P-256 key loaded at startup. The
//! matching public key is published as a JWK so other services can verify
//! tokens without holding the signing key. There is no revocation list: a
//! token is valid until `exp`.

use crate::config::Config;
use crate::models::{IdentityProvider, Jwk, JwkSet};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

const PKCS8_PEM_TAG: &str = "PRIVATE KEY";
const SEC1_PEM_TAG: &str = "EC PRIVATE KEY";

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Provider-scoped user ID
    pub sub: String,
    /// Identity provider the user signed in with
    pub provider: IdentityProvider,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AccessTokenError {
    #[error("invalid signing key: {0}")]
    SigningKey(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Signs and verifies access tokens with a single active key.
pub struct AccessTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_jwk: Jwk,
    issuer: String,
    audience: String,
    expires_in: Duration,
}

impl AccessTokenService {
    /// Build from configuration. A bad key is fatal at startup.
    pub fn from_config(config: &Config) -> Result<Self, AccessTokenError> {
        let der = decode_private_key(&config.access_token_private_key)?;
        Self::from_pkcs8_der(
            &der,
            &config.access_token_issuer,
            &config.access_token_audience,
            config.access_token_ttl,
        )
    }

    /// Build from a PKCS#8 DER encoded P-256 private key.
    pub fn from_pkcs8_der(
        der: &[u8],
        issuer: &str,
        audience: &str,
        expires_in: Duration,
    ) -> Result<Self, AccessTokenError> {
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, der, &SystemRandom::new())
                .map_err(|e| AccessTokenError::SigningKey(format!("not a P-256 PKCS#8 key: {e}")))?;

        // Uncompressed SEC1 point: 0x04 || x || y
        let point = key_pair.public_key().as_ref();
        if point.len() != 65 || point[0] != 0x04 {
            return Err(AccessTokenError::SigningKey(
                "unexpected public key encoding".to_string(),
            ));
        }

        let x = URL_SAFE_NO_PAD.encode(&point[1..33]);
        let y = URL_SAFE_NO_PAD.encode(&point[33..65]);
        let kid = hex::encode(Sha256::digest(point))[..16].to_string();

        let decoding_key = DecodingKey::from_ec_components(&x, &y)
            .map_err(|e| AccessTokenError::SigningKey(e.to_string()))?;

        tracing::info!(kid = %kid, issuer = %issuer, "Access token signing key loaded");

        Ok(Self {
            encoding_key: EncodingKey::from_ec_der(der),
            decoding_key,
            public_jwk: Jwk::p256(kid, x, y),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            expires_in,
        })
    }

    /// Token lifetime.
    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    pub fn kid(&self) -> &str {
        self.public_jwk.kid.as_deref().unwrap_or_default()
    }

    /// Sign a token for `sub` issued now.
    pub fn sign(&self, sub: &str, provider: IdentityProvider) -> Result<String, AccessTokenError> {
        self.sign_issued_at(sub, provider, get_current_timestamp())
    }

    /// Sign a token with an explicit issue time.
    pub fn sign_issued_at(
        &self,
        sub: &str,
        provider: IdentityProvider,
        iat: u64,
    ) -> Result<String, AccessTokenError> {
        let exp = iat
            .checked_add(self.expires_in.as_secs())
            .ok_or_else(|| AccessTokenError::Signing("token expiry overflows".to_string()))?;

        let claims = AccessTokenClaims {
            sub: sub.to_string(),
            provider,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.kid().to_string());

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AccessTokenError::Signing(e.to_string()))
    }

    /// Verify signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, AccessTokenError> {
        let mut validation = Validation::new(Algorithm::ES256);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.leeway = 0;

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AccessTokenError::InvalidToken(e.to_string()))
    }

    /// Public verification key.
    pub fn public_jwk(&self) -> &Jwk {
        &self.public_jwk
    }

    /// Key set document for `/.well-known/jwks.json`.
    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.public_jwk.clone()],
        }
    }
}

/// Decode a PKCS#8 key given as PEM or as bare base64 DER.
///
/// Literal `\n` sequences are accepted since env files often flatten PEM.
pub fn decode_private_key(text: &str) -> Result<Vec<u8>, AccessTokenError> {
    let text = text.replace("\\n", "\n");
    let text = text.trim();

    if text.is_empty() {
        return Err(AccessTokenError::SigningKey("private key is empty".to_string()));
    }

    if !text.starts_with("-----BEGIN") {
        let body: String = text.split_whitespace().collect();
        return STANDARD
            .decode(body)
            .map_err(|e| AccessTokenError::SigningKey(format!("invalid base64: {e}")));
    }

    let block = pem::parse(text)
        .map_err(|e| AccessTokenError::SigningKey(format!("invalid PEM: {e}")))?;

    match block.tag() {
        PKCS8_PEM_TAG => Ok(block.into_contents()),
        SEC1_PEM_TAG => Err(AccessTokenError::SigningKey(
            "SEC1 keys are not supported; convert with `openssl pkcs8 -topk8 -nocrypt`"
                .to_string(),
        )),
        other => Err(AccessTokenError::SigningKey(format!(
            "expected a {PKCS8_PEM_TAG} PEM block, found {other}"
        ))),
    }
}
