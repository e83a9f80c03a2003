// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Batch dispatcher for one poll cycle.
//!
//! A fixed pool of workers drains a queue holding every user exactly once.
//! Each worker runs one user at a time through:
//! 1. Authenticate (refresh token -> access token)
//! 2. Fetch rides for the window
//! 3. Score qualifying rides
//! 4. Commit awards to the ledger, one idempotent write per ride
//!
//! Every user yields an outcome value. Errors and panics inside one user's
//! processing are recorded on that user and never reach other workers.

use crate::db::RewardLedger;
use crate::models::{
    CreditOutcome, CycleResult, FailureKind, PollWindow, RewardAward, User, UserOutcome,
    UserStage,
};
use crate::services::rewards::RewardCalculator;
use crate::services::rides::RideProviderClient;
use chrono::Utc;
use futures_util::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Drives the worker pool for a poll cycle.
#[derive(Clone)]
pub struct BatchDispatcher {
    rides: RideProviderClient,
    calculator: RewardCalculator,
    ledger: Arc<dyn RewardLedger>,
}

type TaskQueue = Arc<Mutex<mpsc::Receiver<User>>>;

impl BatchDispatcher {
    pub fn new(
        rides: RideProviderClient,
        calculator: RewardCalculator,
        ledger: Arc<dyn RewardLedger>,
    ) -> Self {
        Self {
            rides,
            calculator,
            ledger,
        }
    }

    /// Process every user in `users` once, with `worker_count` workers.
    ///
    /// Returns when all workers have drained the queue. If `cancel` fires,
    /// in-flight users stop at their next blocking call and queued users
    /// are reported as cancelled without being started.
    pub async fn run_cycle(
        &self,
        users: Vec<User>,
        worker_count: usize,
        window: PollWindow,
        cancel: &CancellationToken,
    ) -> CycleResult {
        let worker_count = worker_count.max(1);
        let total = users.len();

        tracing::info!(
            users = total,
            workers = worker_count,
            window_start = %window.start,
            window_end = %window.end,
            "Starting poll cycle"
        );

        let user_ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
        let (tx, rx) = mpsc::channel(total.max(1));
        let queue: TaskQueue = Arc::new(Mutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let dispatcher = self.clone();
            let queue = queue.clone();
            let cancel = cancel.clone();
            workers.spawn(async move { dispatcher.worker(worker_id, queue, window, cancel).await });
        }

        // The queue holds every user, so enqueueing never waits on workers.
        for user in users {
            if tx.send(user).await.is_err() {
                tracing::error!("Poll queue closed before all users were enqueued");
                break;
            }
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_outcomes) => outcomes.extend(worker_outcomes),
                Err(e) => tracing::error!(error = %e, "Poll worker terminated abnormally"),
            }
        }
        account_for_lost_users(&user_ids, &mut outcomes);

        let result = CycleResult::from_outcomes(window, worker_count, &outcomes);

        tracing::info!(
            processed = result.processed,
            succeeded = result.succeeded,
            partially_failed = result.partially_failed,
            failed = result.failed,
            awards_created = result.awards_created,
            awards_existing = result.awards_existing,
            "Poll cycle complete"
        );

        result
    }

    /// Pull users off the queue until it is closed and empty.
    async fn worker(
        self,
        worker_id: usize,
        queue: TaskQueue,
        window: PollWindow,
        cancel: CancellationToken,
    ) -> Vec<UserOutcome> {
        let mut outcomes = Vec::new();

        loop {
            // Lock is only held while waiting for the next user.
            let next = queue.lock().await.recv().await;
            let Some(user) = next else {
                break;
            };

            let outcome = if cancel.is_cancelled() {
                UserOutcome::new(&user.id).fail(FailureKind::Cancelled, "cycle cancelled")
            } else {
                self.process_user_isolated(&user, &window, &cancel).await
            };

            outcomes.push(outcome);
        }

        tracing::debug!(worker_id, processed = outcomes.len(), "Poll worker finished");
        outcomes
    }

    /// Run one user, turning a panic into an `Unexpected` failure.
    async fn process_user_isolated(
        &self,
        user: &User,
        window: &PollWindow,
        cancel: &CancellationToken,
    ) -> UserOutcome {
        match AssertUnwindSafe(self.process_user(user, window, cancel))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string());
                tracing::error!(user_id = %user.id, reason = %reason, "Panic while processing user");
                UserOutcome::new(&user.id).fail(FailureKind::Unexpected, reason)
            }
        }
    }

    /// Authenticate, fetch, score and commit for one user.
    async fn process_user(
        &self,
        user: &User,
        window: &PollWindow,
        cancel: &CancellationToken,
    ) -> UserOutcome {
        let mut outcome = UserOutcome::new(&user.id);

        // ─── Authenticating ──────────────────────────────────────
        outcome.stage = UserStage::Authenticating;
        let access_token = match self.rides.authenticate(&user.refresh_token, cancel).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Authentication failed");
                return outcome.fail(FailureKind::from(&e), e.to_string());
            }
        };

        // ─── Fetching ────────────────────────────────────────────
        outcome.stage = UserStage::Fetching;
        let rides = match self.rides.fetch_rides(&access_token, window, cancel).await {
            Ok(rides) => rides,
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Ride fetch failed");
                return outcome.fail(FailureKind::from(&e), e.to_string());
            }
        };
        drop(access_token);
        outcome.rides_fetched = rides.len();

        // ─── Scoring ─────────────────────────────────────────────
        outcome.stage = UserStage::Scoring;
        let now = Utc::now();
        let awards: Vec<RewardAward> = rides
            .iter()
            .filter_map(|ride| {
                let award = self.calculator.award(&user.id, ride, now)?;
                tracing::info!(
                    user_id = %user.id,
                    ride_id = %ride.ride_id,
                    distance_miles = ride.distance_miles,
                    points = award.points,
                    "Qualifying ride"
                );
                Some(award)
            })
            .collect();

        // ─── Committing ──────────────────────────────────────────
        outcome.stage = UserStage::Committing;
        for award in &awards {
            // Earlier awards are already durable; the rest are picked up
            // by the next cycle covering this window.
            if cancel.is_cancelled() {
                return outcome.fail(FailureKind::Cancelled, "cycle cancelled during commit");
            }

            match self.ledger.credit_if_absent(award).await {
                Ok(CreditOutcome::Created) => outcome.awards_created += 1,
                Ok(CreditOutcome::AlreadyExists) => outcome.awards_existing += 1,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user.id,
                        ride_id = %award.ride_id,
                        error = %e,
                        "Failed to commit award"
                    );
                    outcome.ride_failed(&award.ride_id, e.to_string());
                }
            }
        }

        tracing::debug!(
            user_id = %user.id,
            rides = outcome.rides_fetched,
            created = outcome.awards_created,
            existing = outcome.awards_existing,
            "User processed"
        );

        outcome.finish()
    }
}

/// Add an `Unexpected` outcome for every user that never reported back,
/// e.g. because its worker task died.
fn account_for_lost_users(user_ids: &[String], outcomes: &mut Vec<UserOutcome>) {
    let reported: HashSet<&str> = outcomes.iter().map(|o| o.user_id.as_str()).collect();
    let lost: Vec<UserOutcome> = user_ids
        .iter()
        .filter(|id| !reported.contains(id.as_str()))
        .map(|id| {
            UserOutcome::new(id).fail(FailureKind::Unexpected, "worker terminated before reporting")
        })
        .collect();

    if !lost.is_empty() {
        tracing::error!(lost = lost.len(), "Users lost by terminated poll workers");
        outcomes.extend(lost);
    }
}
