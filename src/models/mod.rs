// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod chat;
pub mod identity;
pub mod jwk;

pub use chat::{ChatMessage, ChatRequest, Role};
pub use identity::{IdentityProvider, NormalizedIdentity};
pub use jwk::{Jwk, JwkSet};
