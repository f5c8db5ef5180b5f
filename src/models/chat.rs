// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat request model for the AI proxy routes.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Maximum number of messages in one conversation.
pub const MAX_MESSAGES: u64 = 50;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Body of `POST /v1/ai/reply` and `POST /v1/ai/reply/stream`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(
        length(min = 1, max = MAX_MESSAGES, message = "messages must contain 1-50 entries"),
        custom(function = "validate_contents")
    )]
    pub messages: Vec<ChatMessage>,
    /// Explicit backend name; the priority order applies when absent.
    #[serde(default)]
    pub provider: Option<String>,
}

fn validate_contents(messages: &[ChatMessage]) -> Result<(), ValidationError> {
    if messages.iter().any(|m| m.content.trim().is_empty()) {
        let mut err = ValidationError::new("empty_content");
        err.message = Some("message content must not be empty".into());
        return Err(err);
    }
    Ok(())
}

/// Total characters submitted by the user across the conversation.
///
/// Counts Unicode scalar values, not bytes. Only `user` turns count; system
/// prompts and prior assistant replies are not user-submitted.
pub fn user_content_length(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.chars().count())
        .sum()
}
