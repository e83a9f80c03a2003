// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Poll cycle tests: worker pool, isolation, idempotence and cancellation.

mod common;

use common::{
    canceled_ride, completed_ride, poll_now, store_with_users, test_user, test_window,
    FailingLedger, FakeProvider,
};
use ride_rewards::db::{MemoryStore, RewardLedger};
use ride_rewards::models::{FailureKind, User, UserStage};
use ride_rewards::services::{
    BatchDispatcher, PointsPerMile, PollService, RetryPolicy, RewardCalculator,
    RideProviderClient,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn dispatcher(provider: Arc<FakeProvider>, ledger: Arc<dyn RewardLedger>) -> BatchDispatcher {
    BatchDispatcher::new(
        RideProviderClient::new(provider, RetryPolicy::none()),
        RewardCalculator::new(Arc::new(PointsPerMile::new(10))),
        ledger,
    )
}

/// `count` users, each with three completed rides and one canceled ride.
fn population(count: usize) -> (Vec<User>, FakeProvider) {
    let mut provider = FakeProvider::new();
    let mut users = Vec::new();
    for i in 0..count {
        let user = test_user(&format!("u{:02}", i));
        let rides = vec![
            completed_ride(&format!("{}-a", user.id), 1.0),
            completed_ride(&format!("{}-b", user.id), 2.5),
            canceled_ride(&format!("{}-c", user.id)),
            completed_ride(&format!("{}-d", user.id), 0.35),
        ];
        provider = provider.with_rides(&user.refresh_token, rides);
        users.push(user);
    }
    (users, provider)
}

/// Ledger contents without the award timestamp.
fn ledger_summary(store: &MemoryStore) -> Vec<(String, String, u64)> {
    store
        .all_awards()
        .into_iter()
        .map(|a| (a.user_id, a.ride_id, a.points))
        .collect()
}

#[tokio::test]
async fn test_every_user_processed_exactly_once() {
    let (users, provider) = population(23);
    let provider = Arc::new(provider);
    let store = MemoryStore::new();
    let dispatcher = dispatcher(provider.clone(), Arc::new(store.clone()));

    let result = dispatcher
        .run_cycle(users, 5, test_window(), &CancellationToken::new())
        .await;

    assert_eq!(result.processed, 23);
    assert_eq!(result.succeeded, 23);
    assert_eq!(result.failed, 0);
    assert!(result.is_clean());
    assert_eq!(result.workers, 5);

    // One token exchange per user, never more.
    assert_eq!(provider.exchanges(), 23);

    // Three qualifying rides per user; canceled ride never credited.
    assert_eq!(result.awards_created, 69);
    let awards = store.all_awards();
    assert_eq!(awards.len(), 69);
    assert!(awards.iter().all(|a| !a.ride_id.ends_with("-c")));

    // 10 + 25 + 3 points
    assert_eq!(store.total_points("u07"), 38);
}

#[tokio::test]
async fn test_rerun_same_window_credits_nothing_new() {
    let (users, provider) = population(6);
    let store = MemoryStore::new();
    let dispatcher = dispatcher(Arc::new(provider), Arc::new(store.clone()));
    let cancel = CancellationToken::new();

    let first = dispatcher
        .run_cycle(users.clone(), 3, test_window(), &cancel)
        .await;
    let after_first = ledger_summary(&store);

    let second = dispatcher.run_cycle(users, 3, test_window(), &cancel).await;

    assert_eq!(first.awards_created, 18);
    assert_eq!(second.awards_created, 0);
    assert_eq!(second.awards_existing, 18);
    assert_eq!(second.succeeded, 6);
    assert_eq!(ledger_summary(&store), after_first);
}

#[tokio::test]
async fn test_result_independent_of_worker_count() {
    let mut summaries = Vec::new();

    for workers in [1, 5, 64] {
        let (users, provider) = population(17);
        let store = MemoryStore::new();
        let dispatcher = dispatcher(Arc::new(provider), Arc::new(store.clone()));

        let result = dispatcher
            .run_cycle(users, workers, test_window(), &CancellationToken::new())
            .await;
        assert_eq!(result.processed, 17, "workers = {}", workers);

        summaries.push(ledger_summary(&store));
    }

    assert_eq!(summaries[0], summaries[1]);
    assert_eq!(summaries[0], summaries[2]);
}

#[tokio::test]
async fn test_auth_failure_is_isolated() {
    let (users, provider) = population(8);
    let provider = Arc::new(provider.with_auth_failure("rt-u03"));
    let store = MemoryStore::new();
    let dispatcher = dispatcher(provider, Arc::new(store.clone()));

    let result = dispatcher
        .run_cycle(users, 4, test_window(), &CancellationToken::new())
        .await;

    assert_eq!(result.processed, 8);
    assert_eq!(result.succeeded, 7);
    assert_eq!(result.failed, 1);

    let failure = &result.failures[0];
    assert_eq!(failure.user_id, "u03");
    assert_eq!(failure.kind, FailureKind::Auth);
    assert_eq!(failure.stage, UserStage::Authenticating);

    assert_eq!(store.total_points("u03"), 0);
    assert_eq!(store.all_awards().len(), 21);
}

#[tokio::test]
async fn test_panic_in_one_user_does_not_stop_others() {
    let (users, provider) = population(5);
    let provider = Arc::new(provider.with_panic("rt-u01"));
    let store = MemoryStore::new();
    let dispatcher = dispatcher(provider, Arc::new(store.clone()));

    let result = dispatcher
        .run_cycle(users, 2, test_window(), &CancellationToken::new())
        .await;

    assert_eq!(result.processed, 5);
    assert_eq!(result.succeeded, 4);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failures[0].user_id, "u01");
    assert_eq!(result.failures[0].kind, FailureKind::Unexpected);
    assert!(result.failures[0].reason.contains("provider blew up"));
    assert_eq!(store.all_awards().len(), 12);
}

#[tokio::test]
async fn test_partial_ledger_failure_keeps_other_awards() {
    let (users, provider) = population(2);
    let provider = Arc::new(provider);
    let store = MemoryStore::new();
    let failing = FailingLedger::new(store.clone(), &["u00-b"]);

    let result = dispatcher(provider.clone(), Arc::new(failing))
        .run_cycle(users.clone(), 2, test_window(), &CancellationToken::new())
        .await;

    assert_eq!(result.processed, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.partially_failed, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(result.awards_created, 5);

    let failure = &result.failures[0];
    assert_eq!(failure.user_id, "u00");
    assert_eq!(failure.kind, FailureKind::LedgerWrite);
    assert_eq!(failure.failed_rides, vec!["u00-b".to_string()]);

    // Next cycle over the same window fills in only the missing award.
    let retry = dispatcher(provider, Arc::new(store.clone()))
        .run_cycle(users, 2, test_window(), &CancellationToken::new())
        .await;

    assert!(retry.is_clean());
    assert_eq!(retry.awards_created, 1);
    assert_eq!(retry.awards_existing, 5);
    assert_eq!(store.all_awards().len(), 6);
}

#[tokio::test]
async fn test_cancelled_before_start_reports_every_user() {
    let (users, provider) = population(4);
    let provider = Arc::new(provider);
    let store = MemoryStore::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = dispatcher(provider.clone(), Arc::new(store.clone()))
        .run_cycle(users, 2, test_window(), &cancel)
        .await;

    assert_eq!(result.processed, 4);
    assert_eq!(result.failed, 4);
    assert!(result
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::Cancelled));
    assert_eq!(provider.exchanges(), 0);
    assert!(store.all_awards().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_cycle_stops_promptly() {
    let (users, provider) = population(6);
    let provider = Arc::new(provider.with_page_delay(Duration::from_secs(30)));
    let dispatcher = dispatcher(provider, Arc::new(MemoryStore::new()));
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.run_cycle(users, 2, test_window(), &cancel),
    )
    .await
    .expect("cycle did not stop after cancellation");
    canceller.await.unwrap();

    assert_eq!(result.processed, 6);
    assert_eq!(result.succeeded, 0);
    assert!(result
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::Cancelled));
}

#[tokio::test]
async fn test_empty_directory() {
    let dispatcher = dispatcher(Arc::new(FakeProvider::new()), Arc::new(MemoryStore::new()));

    let result = dispatcher
        .run_cycle(Vec::new(), 5, test_window(), &CancellationToken::new())
        .await;

    assert_eq!(result.processed, 0);
    assert!(result.is_clean());
}

#[tokio::test]
async fn test_users_stored_in_directory_round_trip_through_cycle() {
    let users = vec![test_user("alpha"), test_user("beta")];
    let store = store_with_users(&users).await;
    let provider = FakeProvider::new()
        .with_rides("rt-alpha", vec![completed_ride("shared-id", 4.0)])
        .with_rides("rt-beta", vec![completed_ride("shared-id", 1.0)]);

    let result = dispatcher(Arc::new(provider), Arc::new(store.clone()))
        .run_cycle(users, 2, test_window(), &CancellationToken::new())
        .await;

    // Same ride ID under different users is two distinct awards.
    assert_eq!(result.awards_created, 2);
    assert_eq!(store.total_points("alpha"), 40);
    assert_eq!(store.total_points("beta"), 10);
}

#[tokio::test]
async fn test_cycle_timeout_cancels_workers() {
    let (users, provider) = population(3);
    let provider = Arc::new(provider.with_page_delay(Duration::from_secs(30)));
    let store = store_with_users(&users).await;
    let poller = PollService::new(
        Arc::new(store.clone()),
        dispatcher(provider, Arc::new(store.clone())),
        2,
        Duration::from_millis(100),
    );
    let shutdown = CancellationToken::new();

    let started = std::time::Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        poller.run_cycle(poll_now(), &shutdown),
    )
    .await
    .expect("cycle ignored its timeout")
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.processed, 3);
    assert_eq!(result.failed, 3);
    assert!(result
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::Cancelled));
    assert!(store.all_awards().is_empty());

    // The timeout cancels only that cycle; the next one starts normally.
    assert!(!shutdown.is_cancelled());
    let second = tokio::time::timeout(
        Duration::from_secs(5),
        poller.run_cycle(poll_now(), &shutdown),
    )
    .await
    .expect("second cycle ignored its timeout");
    assert!(second.is_ok(), "second cycle rejected: {:?}", second.err());
}
