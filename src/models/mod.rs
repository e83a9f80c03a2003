// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod cycle;
pub mod reward;
pub mod ride;
pub mod user;
pub mod window;

pub use cycle::{CycleResult, FailureKind, UserFailure, UserOutcome, UserStage, UserStatus};
pub use reward::{CreditOutcome, RewardAward};
pub use ride::{RideRecord, RideStatus};
pub use user::User;
pub use window::PollWindow;
