// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Ride provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
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
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Provider(err) => {
                (StatusCode::BAD_GATEWAY, "provider_error", Some(err.to_string()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors from the ride provider API.
///
/// Only `RateLimited` and `Unavailable` are worth retrying; everything else
/// fails the same way on every attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Refresh or access token rejected (expired, revoked, invalid_grant).
    #[error("credential rejected: {0}")]
    Auth(String),

    #[error("rate limited by ride provider")]
    RateLimited,

    /// 5xx, timeouts and transport failures.
    #[error("ride provider unavailable: {0}")]
    Unavailable(String),

    /// Non-retryable 4xx other than auth failures.
    #[error("ride provider rejected request: {0}")]
    Rejected(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether a retry with backoff could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::RateLimited | ProviderError::Unavailable(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            // Connect errors, timeouts and broken bodies are all worth a retry.
            ProviderError::Unavailable(err.to_string())
        }
    }
}
