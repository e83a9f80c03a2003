// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Reward ledger records.

use serde::{Deserialize, Serialize};

/// Points credited to a user for one ride.
///
/// At most one award exists per (user_id, ride_id); the ledger enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAward {
    pub user_id: String,
    pub ride_id: String,
    pub points: u64,
    /// When the award was credited (RFC 3339)
    pub awarded_at: String,
}

impl RewardAward {
    /// Ledger document ID for this award.
    ///
    /// Both parts are percent-encoded, so the `:` separator cannot occur
    /// inside either of them and no path separators reach the store.
    pub fn ledger_key(&self) -> String {
        ledger_key(&self.user_id, &self.ride_id)
    }
}

/// Ledger document ID for a (user, ride) pair.
pub fn ledger_key(user_id: &str, ride_id: &str) -> String {
    format!(
        "{}:{}",
        urlencoding::encode(user_id),
        urlencoding::encode(ride_id)
    )
}

/// Result of an idempotent ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditOutcome {
    Created,
    AlreadyExists,
}
