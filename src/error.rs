// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::models::IdentityProvider;
use crate::services::access_token::AccessTokenError;
use crate::services::ai::AiError;
use crate::services::identity::IdentityError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{0} sign-in is not configured")]
    ProviderNotConfigured(IdentityProvider),

    #[error("Identity token verification failed")]
    AuthFailed,

    #[error("Authorization header is missing")]
    MissingAuthHeader,

    #[error("Authorization header must use the Bearer scheme")]
    InvalidAuthFormat,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Letter exceeds {max} characters")]
    ContentTooLong { max: usize },

    #[error("Too many requests; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ProviderNotConfigured(IdentityProvider::Google) => "GOOGLE_NOT_CONFIGURED",
            AppError::ProviderNotConfigured(IdentityProvider::Apple) => "APPLE_NOT_CONFIGURED",
            AppError::AuthFailed => "AUTH_FAILED",
            AppError::MissingAuthHeader => "MISSING_AUTH_HEADER",
            AppError::InvalidAuthFormat => "INVALID_AUTH_FORMAT",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::ContentTooLong { .. } => "CONTENT_TOO_LONG",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::AiProvider(_) => "AI_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::ProviderNotConfigured(_)
            | AppError::ContentTooLong { .. } => StatusCode::BAD_REQUEST,
            AppError::AuthFailed
            | AppError::MissingAuthHeader
            | AppError::InvalidAuthFormat
            | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) | AppError::AiProvider(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let details = match &self {
            AppError::Validation(msg) => Some(msg.clone()),
            AppError::ProviderNotConfigured(_)
            | AppError::ContentTooLong { .. }
            | AppError::RateLimited { .. } => Some(self.to_string()),
            AppError::ServiceUnavailable(msg) => Some(msg.clone()),
            AppError::AiProvider(msg) => {
                // Upstream detail stays in the logs.
                tracing::error!(error = %msg, "AI provider error");
                None
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                None
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        let retry_after = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::ProviderNotConfigured(provider) => {
                AppError::ProviderNotConfigured(provider)
            }
            other => {
                tracing::warn!(error = %other, "Identity token rejected");
                AppError::AuthFailed
            }
        }
    }
}

impl From<AccessTokenError> for AppError {
    fn from(err: AccessTokenError) -> Self {
        match err {
            AccessTokenError::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Access token rejected");
                AppError::InvalidToken
            }
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::NoProviderConfigured => {
                AppError::ServiceUnavailable("No AI provider is configured".to_string())
            }
            AiError::ProviderUnavailable(kind) => {
                AppError::ServiceUnavailable(format!("AI provider {kind} is not configured"))
            }
            other => AppError::AiProvider(other.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
