// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Ride records fetched from the provider. Never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ride lifecycle status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RideStatus {
    Pending,
    Accepted,
    Arrived,
    PickedUp,
    DroppedOff,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl RideStatus {
    /// Only fully completed rides earn rewards.
    pub fn is_completed(self) -> bool {
        self == RideStatus::DroppedOff
    }
}

/// One ride from a user's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRecord {
    /// Provider ride ID
    pub ride_id: String,
    /// Distance in miles
    pub distance_miles: f64,
    pub status: RideStatus,
    /// Drop-off time, or request time for rides that never finished
    pub end_time: DateTime<Utc>,
}
