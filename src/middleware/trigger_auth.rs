// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer-token guard for the poll trigger.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Require `Authorization: Bearer <POLL_TRIGGER_TOKEN>`.
pub async fn require_trigger_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(presented) = presented else {
        tracing::warn!("Blocked poll trigger without bearer token");
        return Err(AppError::Unauthorized);
    };

    // Slices of different length compare unequal.
    let expected = state.config.poll_trigger_token.as_bytes();
    if !bool::from(presented.as_bytes().ct_eq(expected)) {
        tracing::warn!("Blocked poll trigger with invalid bearer token");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
