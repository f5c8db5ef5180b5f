// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - token handling and AI backends.

pub mod access_token;
pub mod ai;
pub mod identity;
pub mod key_cache;
pub mod relay;

pub use access_token::{AccessTokenClaims, AccessTokenError, AccessTokenService};
pub use ai::{AiError, AiProvider, ProviderKind, ProviderRegistry};
pub use identity::{IdentityError, IdentityVerifier};
pub use key_cache::{KeyCacheError, KeySet, RemoteKeyCache};
pub use relay::{relay, RelayEvent, RelayStream, StreamFormat};
