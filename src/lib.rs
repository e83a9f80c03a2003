// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Ride-Rewards: loyalty points for completed Lyft rides
//!
//! This crate provides the backend that enrolls riders through Lyft OAuth
//! and, on each poll trigger, credits points for the previous day's rides.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{RewardLedger, UserDirectory};
use services::{
    BatchDispatcher, EnrollmentService, LyftClient, PointsPerMile, PollService, RetryPolicy,
    RewardCalculator, RideProvider, RideProviderClient,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub directory: Arc<dyn UserDirectory>,
    pub ledger: Arc<dyn RewardLedger>,
    pub enrollment: EnrollmentService,
    pub poller: PollService,
    /// Cancelled on process shutdown; in-flight cycles stop with it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire up services. `provider` is the ride source used by poll
    /// workers; in production it is the same `LyftClient`.
    pub fn new(
        config: Config,
        directory: Arc<dyn UserDirectory>,
        ledger: Arc<dyn RewardLedger>,
        lyft: LyftClient,
        provider: Arc<dyn RideProvider>,
    ) -> Self {
        let rides = RideProviderClient::new(provider, RetryPolicy::from_config(&config));
        let calculator =
            RewardCalculator::new(Arc::new(PointsPerMile::new(config.points_per_mile)));
        let dispatcher = BatchDispatcher::new(rides, calculator, ledger.clone());

        let poller = PollService::new(
            directory.clone(),
            dispatcher,
            config.poll_workers,
            config.cycle_timeout,
        );
        let enrollment = EnrollmentService::new(lyft, directory.clone());

        Self {
            config,
            directory,
            ledger,
            enrollment,
            poller,
            shutdown: CancellationToken::new(),
        }
    }
}
