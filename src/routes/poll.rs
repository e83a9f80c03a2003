// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Poll trigger route.

use crate::error::Result;
use crate::middleware::require_trigger_token;
use crate::models::CycleResult;
use crate::AppState;
use axum::{extract::State, middleware, routing::get, Json, Router};
use std::sync::Arc;

/// `/poll` runs one cycle and answers when it is done.
pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/poll", get(trigger_poll).post(trigger_poll))
        .route_layer(middleware::from_fn_with_state(state, require_trigger_token))
}

async fn trigger_poll(State(state): State<Arc<AppState>>) -> Result<Json<CycleResult>> {
    tracing::info!("Poll cycle triggered");

    let result = state
        .poller
        .run_cycle(chrono::Utc::now(), &state.shutdown)
        .await?;

    if !result.is_clean() {
        tracing::warn!(
            failed = result.failed,
            partially_failed = result.partially_failed,
            "Poll cycle finished with failures"
        );
    }

    Ok(Json(result))
}
