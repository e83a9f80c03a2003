// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Per-user outcomes and the aggregated result of one poll cycle.

use crate::error::ProviderError;
use crate::models::PollWindow;
use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Where a user's processing stood when it finished or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum UserStage {
    Pending,
    Authenticating,
    Fetching,
    Scoring,
    Committing,
    Done,
}

/// Classification of a per-user failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Refresh token expired or revoked; the user must re-enroll.
    Auth,
    /// Provider failure that survived retries.
    Provider,
    /// One or more award writes failed.
    LedgerWrite,
    /// Anything unclassified, including panics.
    Unexpected,
    /// The cycle was cancelled before this user finished.
    Cancelled,
}

impl From<&ProviderError> for FailureKind {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::Auth(_) => FailureKind::Auth,
            ProviderError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Provider,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Succeeded,
    /// Some awards were committed, at least one write failed.
    PartiallyFailed,
    Failed,
}

/// What happened to one user during a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct UserOutcome {
    pub user_id: String,
    pub status: UserStatus,
    pub stage: UserStage,
    pub rides_fetched: usize,
    pub awards_created: usize,
    pub awards_existing: usize,
    pub failure: Option<FailureKind>,
    pub reason: Option<String>,
    /// Rides whose award could not be written
    pub failed_rides: Vec<String>,
}

impl UserOutcome {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            status: UserStatus::Succeeded,
            stage: UserStage::Pending,
            rides_fetched: 0,
            awards_created: 0,
            awards_existing: 0,
            failure: None,
            reason: None,
            failed_rides: Vec::new(),
        }
    }

    /// Terminal failure at the current stage.
    pub fn fail(mut self, kind: FailureKind, reason: impl Into<String>) -> Self {
        self.status = UserStatus::Failed;
        self.failure = Some(kind);
        self.reason = Some(reason.into());
        self
    }

    /// Record a failed award write; processing continues.
    pub fn ride_failed(&mut self, ride_id: &str, reason: impl Into<String>) {
        self.failed_rides.push(ride_id.to_string());
        self.status = UserStatus::PartiallyFailed;
        self.failure = Some(FailureKind::LedgerWrite);
        self.reason = Some(reason.into());
    }

    /// Mark the unit done, keeping any partial failure already recorded.
    pub fn finish(mut self) -> Self {
        self.stage = UserStage::Done;
        self
    }
}

/// A user that did not fully succeed, as reported to the trigger.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserFailure {
    pub user_id: String,
    pub kind: FailureKind,
    pub stage: UserStage,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_rides: Vec<String>,
}

/// Aggregated result of one poll cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub window: PollWindow,
    pub workers: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub partially_failed: usize,
    pub failed: usize,
    pub awards_created: usize,
    pub awards_existing: usize,
    pub failures: Vec<UserFailure>,
}

impl CycleResult {
    pub fn from_outcomes(window: PollWindow, workers: usize, outcomes: &[UserOutcome]) -> Self {
        let mut result = Self {
            window,
            workers,
            processed: outcomes.len(),
            succeeded: 0,
            partially_failed: 0,
            failed: 0,
            awards_created: 0,
            awards_existing: 0,
            failures: Vec::new(),
        };

        for outcome in outcomes {
            result.awards_created += outcome.awards_created;
            result.awards_existing += outcome.awards_existing;

            match outcome.status {
                UserStatus::Succeeded => result.succeeded += 1,
                UserStatus::PartiallyFailed => result.partially_failed += 1,
                UserStatus::Failed => result.failed += 1,
            }

            if outcome.status != UserStatus::Succeeded {
                result.failures.push(UserFailure {
                    user_id: outcome.user_id.clone(),
                    kind: outcome.failure.unwrap_or(FailureKind::Unexpected),
                    stage: outcome.stage,
                    reason: outcome.reason.clone().unwrap_or_default(),
                    failed_rides: outcome.failed_rides.clone(),
                });
            }
        }

        result
            .failures
            .sort_by(|a, b| a.user_id.cmp(&b.user_id));
        result
    }

    /// Every user finished without any failure.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
