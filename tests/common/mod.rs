// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ride_rewards::config::Config;
use ride_rewards::db::{FirestoreDb, MemoryStore, RewardLedger, UserDirectory};
use ride_rewards::error::{AppError, ProviderError, Result};
use ride_rewards::models::{CreditOutcome, PollWindow, RewardAward, RideRecord, RideStatus, User};
use ride_rewards::routes::create_router;
use ride_rewards::services::{AccessToken, LyftClient, RideProvider};
use ride_rewards::services::rides::RidePage;
use ride_rewards::AppState;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Fixed "now" used by cycle tests: the window is all of 2024-03-01.
#[allow(dead_code)]
pub fn poll_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn test_window() -> PollWindow {
    PollWindow::previous_utc_day(poll_now())
}

/// User whose refresh token is `rt-{id}`.
#[allow(dead_code)]
pub fn test_user(id: &str) -> User {
    User {
        id: id.to_string(),
        external_account_id: format!("lyft-{}", id),
        refresh_token: format!("rt-{}", id),
        created_at: "2024-01-15T10:00:00Z".to_string(),
        updated_at: "2024-01-15T10:00:00Z".to_string(),
    }
}

#[allow(dead_code)]
pub fn completed_ride(id: &str, distance_miles: f64) -> RideRecord {
    RideRecord {
        ride_id: id.to_string(),
        distance_miles,
        status: RideStatus::DroppedOff,
        end_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    }
}

#[allow(dead_code)]
pub fn canceled_ride(id: &str) -> RideRecord {
    RideRecord {
        status: RideStatus::Canceled,
        ..completed_ride(id, 3.0)
    }
}

/// In-process ride provider keyed by refresh token.
///
/// Rides are served two per page so every user with more than two rides
/// exercises pagination.
#[derive(Default)]
pub struct FakeProvider {
    rides: HashMap<String, Vec<RideRecord>>,
    auth_failures: HashSet<String>,
    panics: HashSet<String>,
    page_delay: Option<Duration>,
    pub exchange_calls: AtomicUsize,
    pub page_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rides(mut self, refresh_token: &str, rides: Vec<RideRecord>) -> Self {
        self.rides.insert(refresh_token.to_string(), rides);
        self
    }

    /// Token exchange for `refresh_token` fails with `invalid_grant`.
    pub fn with_auth_failure(mut self, refresh_token: &str) -> Self {
        self.auth_failures.insert(refresh_token.to_string());
        self
    }

    /// Fetching rides for `refresh_token` panics.
    pub fn with_panic(mut self, refresh_token: &str) -> Self {
        self.panics.insert(refresh_token.to_string());
        self
    }

    /// Every page request sleeps this long first.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    pub fn exchanges(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }
}

const PAGE_SIZE: usize = 2;

#[async_trait]
impl RideProvider for FakeProvider {
    async fn exchange_token(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<AccessToken, ProviderError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if self.auth_failures.contains(refresh_token) {
            return Err(ProviderError::Auth("invalid_grant".to_string()));
        }
        Ok(AccessToken::new(format!("access:{}", refresh_token)))
    }

    async fn fetch_ride_page(
        &self,
        access_token: &AccessToken,
        _window: &PollWindow,
        cursor: Option<&str>,
    ) -> std::result::Result<RidePage, ProviderError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.page_delay {
            tokio::time::sleep(delay).await;
        }

        let refresh_token = access_token
            .secret()
            .strip_prefix("access:")
            .ok_or_else(|| ProviderError::Auth("unknown access token".to_string()))?;

        if self.panics.contains(refresh_token) {
            panic!("provider blew up for {}", refresh_token);
        }

        let all = self.rides.get(refresh_token).cloned().unwrap_or_default();
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (offset + PAGE_SIZE).min(all.len());
        let rides = all.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_cursor = (end < all.len()).then(|| end.to_string());

        Ok(RidePage { rides, next_cursor })
    }
}

/// Ledger that refuses writes for chosen ride IDs and delegates the rest.
#[allow(dead_code)]
pub struct FailingLedger {
    pub inner: MemoryStore,
    failing_rides: HashSet<String>,
}

#[allow(dead_code)]
impl FailingLedger {
    pub fn new(inner: MemoryStore, failing_rides: &[&str]) -> Self {
        Self {
            inner,
            failing_rides: failing_rides.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl RewardLedger for FailingLedger {
    async fn credit_if_absent(&self, award: &RewardAward) -> Result<CreditOutcome> {
        if self.failing_rides.contains(&award.ride_id) {
            return Err(AppError::Database(format!(
                "simulated write failure for {}",
                award.ride_id
            )));
        }
        self.inner.credit_if_absent(award).await
    }

    async fn get_award(&self, user_id: &str, ride_id: &str) -> Result<Option<RewardAward>> {
        self.inner.get_award(user_id, ride_id).await
    }

    async fn list_awards_for_user(&self, user_id: &str) -> Result<Vec<RewardAward>> {
        self.inner.list_awards_for_user(user_id).await
    }
}

/// Store the given users in a fresh memory store.
#[allow(dead_code)]
pub async fn store_with_users(users: &[User]) -> MemoryStore {
    let store = MemoryStore::new();
    for user in users {
        store.upsert_user(user).await.unwrap();
    }
    store
}

/// Lyft client pointed at an address nothing listens on.
#[allow(dead_code)]
pub fn offline_lyft(config: &Config) -> LyftClient {
    LyftClient::new(
        config.lyft_client_id.clone(),
        config.lyft_client_secret.clone(),
        config.lyft_api_base.clone(),
        Duration::from_secs(1),
    )
    .unwrap()
}

/// Directory whose next `failures` reads fail, then serves `inner`.
#[allow(dead_code)]
pub struct FlakyDirectory {
    pub inner: MemoryStore,
    failures: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyDirectory {
    pub fn new(inner: MemoryStore, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl UserDirectory for FlakyDirectory {
    async fn list_users(&self) -> Result<Vec<User>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::Database("simulated directory outage".to_string()));
        }
        self.inner.list_users().await
    }

    async fn find_by_external_id(&self, external_account_id: &str) -> Result<Option<User>> {
        self.inner.find_by_external_id(external_account_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.inner.upsert_user(user).await
    }
}

/// Create a test app backed by `store` and `provider`.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app(
    store: MemoryStore,
    provider: Arc<FakeProvider>,
) -> (axum::Router, Arc<AppState>) {
    let store = Arc::new(store);
    create_test_app_with(store.clone(), store, provider)
}

/// Create a test app with an explicit directory and ledger.
#[allow(dead_code)]
pub fn create_test_app_with(
    directory: Arc<dyn UserDirectory>,
    ledger: Arc<dyn RewardLedger>,
    provider: Arc<FakeProvider>,
) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let lyft = offline_lyft(&config);

    let state = Arc::new(AppState::new(config, directory, ledger, lyft, provider));

    (create_router(state.clone()), state)
}
