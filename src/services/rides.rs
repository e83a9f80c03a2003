// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ride provider boundary: token exchange, paginated ride history, retries.
//!
//! `RideProvider` is the raw API (one request per call). `RideProviderClient`
//! layers on what the poll workers need:
//! - Bounded retry with exponential backoff for transient failures
//! - Transparent pagination over the whole window
//! - Cancellation of every in-flight call

use crate::config::Config;
use crate::error::ProviderError;
use crate::models::{PollWindow, RideRecord};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on pages followed for one window.
const MAX_PAGES: usize = 200;

/// Backoff never waits longer than this between attempts.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Short-lived bearer token for a single fetch.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// One page of ride history.
#[derive(Debug, Clone, Default)]
pub struct RidePage {
    pub rides: Vec<RideRecord>,
    /// Opaque position of the next page, `None` when the window is exhausted
    pub next_cursor: Option<String>,
}

/// Raw ride provider API.
#[async_trait]
pub trait RideProvider: Send + Sync {
    /// Exchange a refresh token for an access token.
    async fn exchange_token(&self, refresh_token: &str) -> Result<AccessToken, ProviderError>;

    /// Fetch one page of the user's rides within `window`.
    async fn fetch_ride_page(
        &self,
        access_token: &AccessToken,
        window: &PollWindow,
        cursor: Option<&str>,
    ) -> Result<RidePage, ProviderError>;
}

/// Retry schedule for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.provider_max_attempts.max(1),
            base_delay: config.provider_retry_base,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based): base * 2^(attempt-1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

/// Ride fetching as the poll workers use it.
#[derive(Clone)]
pub struct RideProviderClient {
    provider: Arc<dyn RideProvider>,
    retry: RetryPolicy,
}

impl RideProviderClient {
    pub fn new(provider: Arc<dyn RideProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Exchange the user's refresh token for a fresh access token.
    ///
    /// Tokens are never cached: each call performs its own exchange.
    pub async fn authenticate(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<AccessToken, ProviderError> {
        self.with_retry("exchange_token", cancel, || {
            self.provider.exchange_token(refresh_token)
        })
        .await
    }

    /// Fetch every ride in `window`, following pagination.
    ///
    /// Rides repeated across page boundaries are returned once.
    pub async fn fetch_rides(
        &self,
        access_token: &AccessToken,
        window: &PollWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RideRecord>, ProviderError> {
        let mut rides = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        for page_number in 1..=MAX_PAGES {
            let page = self
                .with_retry("fetch_ride_page", cancel, || {
                    self.provider
                        .fetch_ride_page(access_token, window, cursor.as_deref())
                })
                .await?;

            for ride in page.rides {
                if seen.insert(ride.ride_id.clone()) {
                    rides.push(ride);
                }
            }

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => return Ok(rides),
            }

            tracing::debug!(page = page_number, fetched = rides.len(), "Following ride pagination");
        }

        tracing::warn!(
            max_pages = MAX_PAGES,
            fetched = rides.len(),
            "Ride pagination limit reached, window truncated"
        );
        Ok(rides)
    }

    /// Run `call` until it succeeds, fails permanently, runs out of
    /// attempts, or `cancel` fires.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                result = call() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => err,
                Err(err) => return Err(err),
            };

            let delay = self.retry.delay_after(attempt);
            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient provider error, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
