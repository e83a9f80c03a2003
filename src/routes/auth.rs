// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lyft enrollment routes.
//!
//! `/auth` sends the browser to Lyft with a signed `state`; `/redirect` is
//! the OAuth callback that stores the user and their refresh token.

use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    routing::get,
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AppError, Result};
use crate::services::enrollment::random_hex;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long a signed state stays valid (10 minutes).
const STATE_MAX_AGE_MS: u128 = 10 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(landing))
        .route("/auth", get(auth_start))
        .route("/redirect", get(auth_callback))
        .route("/success", get(auth_success))
}

async fn landing() -> Html<&'static str> {
    Html(r#"<html><body><a href="/auth">Login with Lyft</a></body></html>"#)
}

async fn auth_success() -> Html<&'static str> {
    Html("<html><body>Success!</body></html>")
}

/// Start OAuth flow - redirect to Lyft authorization.
async fn auth_start(State(state): State<Arc<AppState>>) -> Result<Redirect> {
    let oauth_state = sign_state(&state.config.oauth_state_key, now_millis()?)?;
    let auth_url = state.enrollment.authorize_url(&oauth_state);

    tracing::info!(
        client_id = %state.config.lyft_client_id,
        "Starting OAuth flow, redirecting to Lyft"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens and enroll the user.
///
/// Every failure sends the browser back to the landing page.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let now = match now_millis() {
        Ok(now) => now,
        Err(e) => {
            tracing::error!(error = %e, "Clock error during OAuth callback");
            return Redirect::temporary("/");
        }
    };

    if !verify_state(&params.state, &state.config.oauth_state_key, now) {
        tracing::warn!("Invalid, expired or tampered OAuth state parameter");
        return Redirect::temporary("/");
    }

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Lyft");
        return Redirect::temporary("/");
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!("OAuth callback without authorization code");
        return Redirect::temporary("/");
    };

    match state.enrollment.handle_callback(&code).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "OAuth successful, user stored");
            Redirect::temporary("/success")
        }
        Err(e) => {
            tracing::error!(error = %e, "Enrollment failed");
            Redirect::temporary("/")
        }
    }
}

fn now_millis() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}

/// Build a signed state: base64("nonce_hex|timestamp_hex|signature_hex").
fn sign_state(secret: &[u8], now_ms: u128) -> Result<String> {
    let payload = format!("{}|{:x}", random_hex::<16>()?, now_ms);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Check the signature and age of a state produced by `sign_state`.
fn verify_state(state: &str, secret: &[u8], now_ms: u128) -> bool {
    let Some(state_str) = URL_SAFE_NO_PAD
        .decode(state)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    else {
        return false;
    };

    let parts: Vec<&str> = state_str.splitn(3, '|').collect();
    let [nonce, timestamp_hex, signature_hex] = parts[..] else {
        return false;
    };

    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(format!("{}|{}", nonce, timestamp_hex).as_bytes());

    // Constant-time comparison
    if mac.verify_slice(&signature).is_err() {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return false;
    }

    match u128::from_str_radix(timestamp_hex, 16) {
        Ok(issued) => issued <= now_ms && now_ms - issued <= STATE_MAX_AGE_MS,
        Err(_) => false,
    }
}
