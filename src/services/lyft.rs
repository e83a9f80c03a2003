// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lyft API client.
//!
//! Handles:
//! - Authorization URL construction and code exchange (enrollment)
//! - Refresh-token exchange (every poll)
//! - Profile lookup
//! - Ride history listing with time-based paging

use crate::error::ProviderError;
use crate::models::{PollWindow, RideRecord, RideStatus};
use crate::services::rides::{AccessToken, RidePage, RideProvider};
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Scopes requested at enrollment. `offline` is what yields a refresh token.
pub const OAUTH_SCOPES: &str = "public profile rides.read offline";

/// Maximum page size accepted by the ride history endpoint.
pub const RIDES_PAGE_SIZE: usize = 50;

/// Lyft API client.
#[derive(Clone)]
pub struct LyftClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl LyftClient {
    /// Create a new client with OAuth credentials.
    pub fn new(
        client_id: String,
        client_secret: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ride-rewards/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Rejected(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        })
    }

    /// URL the user is redirected to in order to grant access.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}/oauth/authorize?client_id={}&response_type=code&scope={}&state={}",
            self.base_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(OAUTH_SCOPES),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        self.token_request(serde_json::json!({
            "grant_type": "authorization_code",
            "code": code,
        }))
        .await
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, ProviderError> {
        self.token_request(serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        }))
        .await
    }

    /// Get the authenticated user's profile.
    pub async fn get_profile(&self, access_token: &AccessToken) -> Result<LyftProfile, ProviderError> {
        let url = format!("{}/v1/profile", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token.secret())
            .send()
            .await?;

        check_response_json(response).await
    }

    /// List rides requested in `[start_time, end_time)`, oldest first.
    pub async fn list_rides(
        &self,
        access_token: &AccessToken,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LyftRide>, ProviderError> {
        let url = format!("{}/v1/rides", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token.secret())
            .query(&[
                ("start_time", format_utc_rfc3339(start_time)),
                ("end_time", format_utc_rfc3339(end_time)),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        let history: RideHistoryResponse = check_response_json(response).await?;
        Ok(history.ride_history)
    }

    async fn token_request(&self, body: serde_json::Value) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .json(&body)
            .send()
            .await?;

        check_response_json(response).await
    }
}

#[async_trait]
impl RideProvider for LyftClient {
    async fn exchange_token(&self, refresh_token: &str) -> Result<AccessToken, ProviderError> {
        let tokens = self.refresh_access_token(refresh_token).await?;
        Ok(AccessToken::new(tokens.access_token))
    }

    /// The cursor is the `requested_at` of the newest ride seen so far; the
    /// next page starts there and the client drops the overlap.
    async fn fetch_ride_page(
        &self,
        access_token: &AccessToken,
        window: &PollWindow,
        cursor: Option<&str>,
    ) -> Result<RidePage, ProviderError> {
        let start = match cursor {
            Some(c) => parse_utc_rfc3339(c)
                .map_err(|e| ProviderError::Malformed(format!("bad page cursor '{}': {}", c, e)))?,
            None => window.start,
        };

        let rides = self
            .list_rides(access_token, start, window.end, RIDES_PAGE_SIZE)
            .await?;

        let newest = rides.iter().map(|r| r.requested_at).max();
        let next_cursor = match newest {
            Some(newest) if rides.len() >= RIDES_PAGE_SIZE => {
                if newest > start {
                    Some(format_utc_rfc3339(newest))
                } else {
                    // The cursor has one-second resolution and cannot move
                    // past a full page requested in the same second.
                    tracing::warn!(
                        requested_at = %format_utc_rfc3339(newest),
                        page_size = rides.len(),
                        "Full ride page cannot advance cursor, window truncated"
                    );
                    None
                }
            }
            _ => None,
        };

        Ok(RidePage {
            rides: rides.into_iter().map(RideRecord::from).collect(),
            next_cursor,
        })
    }
}

/// Map a non-success status to the provider error taxonomy.
async fn error_for_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 | 403 => ProviderError::Auth(format!("HTTP {}", status)),
        400 if body.contains("invalid_grant") => ProviderError::Auth("invalid_grant".to_string()),
        429 => {
            tracing::warn!("Lyft rate limit hit (429)");
            ProviderError::RateLimited
        }
        500..=599 => ProviderError::Unavailable(format!("HTTP {}", status)),
        _ => ProviderError::Rejected(format!("HTTP {}: {}", status, body)),
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    if !response.status().is_success() {
        return Err(error_for_response(response).await);
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::Malformed(e.to_string()))
}

/// OAuth token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only present for `authorization_code` grants with the offline scope
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Profile of the authenticated user.
#[derive(Debug, Clone, Deserialize)]
pub struct LyftProfile {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct RideHistoryResponse {
    #[serde(default)]
    ride_history: Vec<LyftRide>,
}

/// Ride as returned by the ride history endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LyftRide {
    pub ride_id: String,
    pub status: RideStatus,
    #[serde(default)]
    pub distance_miles: Option<f64>,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub dropoff: Option<LyftStop>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LyftStop {
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl From<LyftRide> for RideRecord {
    fn from(ride: LyftRide) -> Self {
        let end_time = ride
            .dropoff
            .and_then(|d| d.time)
            .unwrap_or(ride.requested_at);

        RideRecord {
            ride_id: ride.ride_id,
            distance_miles: ride.distance_miles.unwrap_or(0.0),
            status: ride.status,
            end_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ride_history() {
        let json = r#"{
            "ride_history": [
                {
                    "ride_id": "1001",
                    "status": "droppedOff",
                    "distance_miles": 4.2,
                    "requested_at": "2024-03-01T08:00:00Z",
                    "dropoff": { "time": "2024-03-01T08:25:00Z", "lat": 37.7, "lng": -122.4 }
                },
                {
                    "ride_id": "1002",
                    "status": "canceled",
                    "requested_at": "2024-03-01T09:00:00Z"
                }
            ]
        }"#;

        let parsed: RideHistoryResponse = serde_json::from_str(json).unwrap();
        let rides: Vec<RideRecord> = parsed.ride_history.into_iter().map(Into::into).collect();

        assert_eq!(rides.len(), 2);
        assert_eq!(rides[0].ride_id, "1001");
        assert_eq!(rides[0].status, RideStatus::DroppedOff);
        assert_eq!(rides[0].distance_miles, 4.2);
        assert_eq!(format_utc_rfc3339(rides[0].end_time), "2024-03-01T08:25:00Z");

        assert_eq!(rides[1].status, RideStatus::Canceled);
        assert_eq!(rides[1].distance_miles, 0.0);
        assert_eq!(format_utc_rfc3339(rides[1].end_time), "2024-03-01T09:00:00Z");
    }

    #[test]
    fn test_empty_history() {
        let parsed: RideHistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.ride_history.is_empty());
    }

    #[test]
    fn test_authorize_url() {
        let client = LyftClient::new(
            "client id".to_string(),
            "secret".to_string(),
            "https://api.lyft.com/".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();

        let url = client.authorize_url("abc=");
        assert!(url.starts_with("https://api.lyft.com/oauth/authorize?"));
        assert!(url.contains("client_id=client%20id"));
        assert!(url.contains("scope=public%20profile%20rides.read%20offline"));
        assert!(url.contains("state=abc%3D"));
        assert!(url.contains("response_type=code"));
    }
}
