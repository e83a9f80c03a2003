// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod dispatcher;
pub mod enrollment;
pub mod lyft;
pub mod poll;
pub mod rewards;
pub mod rides;

pub use dispatcher::BatchDispatcher;
pub use enrollment::EnrollmentService;
pub use lyft::LyftClient;
pub use poll::PollService;
pub use rewards::{PointsPerMile, RewardCalculator, RewardPolicy};
pub use rides::{AccessToken, RetryPolicy, RideProvider, RideProviderClient};
