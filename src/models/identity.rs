// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity types shared by the exchange flow and the auth gate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External sign-in provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    Google,
    Apple,
}

impl IdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProvider::Google => "google",
            IdentityProvider::Apple => "apple",
        }
    }
}

impl fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(IdentityProvider::Google),
            "apple" => Ok(IdentityProvider::Apple),
            other => Err(format!("unsupported identity provider: {other}")),
        }
    }
}

/// User identity extracted from a verified external token.
///
/// Only lives for the duration of one exchange request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIdentity {
    pub user_id: String,
    /// Present only when the provider asserted it as verified.
    pub email: Option<String>,
    pub name: Option<String>,
}
