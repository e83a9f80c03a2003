// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reward scoring.
//!
//! Scoring is pure: it never touches the ledger, so it is safe to call from
//! any number of workers at once. Double-crediting is prevented by the
//! ledger's idempotent write, not here.

use crate::models::{RewardAward, RideRecord};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Maps a ride distance to points.
///
/// Implementations must be non-negative (trivially, via `u64`) and
/// monotonic: a longer ride never earns fewer points than a shorter one.
pub trait RewardPolicy: Send + Sync {
    fn points_for_distance(&self, distance_miles: f64) -> u64;
}

/// Linear policy: `points_per_mile` per mile, rounded down to whole points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsPerMile {
    pub points_per_mile: u32,
}

impl PointsPerMile {
    pub fn new(points_per_mile: u32) -> Self {
        Self { points_per_mile }
    }
}

impl RewardPolicy for PointsPerMile {
    fn points_for_distance(&self, distance_miles: f64) -> u64 {
        if distance_miles.is_nan() || distance_miles <= 0.0 {
            return 0;
        }
        // Float-to-int casts saturate, so huge distances cap at u64::MAX.
        (distance_miles * f64::from(self.points_per_mile)).floor() as u64
    }
}

/// Turns qualifying rides into awards.
#[derive(Clone)]
pub struct RewardCalculator {
    policy: Arc<dyn RewardPolicy>,
}

impl RewardCalculator {
    pub fn new(policy: Arc<dyn RewardPolicy>) -> Self {
        Self { policy }
    }

    /// Points for `ride`, or `None` if it does not qualify.
    pub fn score(&self, ride: &RideRecord) -> Option<u64> {
        if !ride.status.is_completed() {
            return None;
        }
        Some(self.policy.points_for_distance(ride.distance_miles))
    }

    /// Build the award for a qualifying ride.
    pub fn award(
        &self,
        user_id: &str,
        ride: &RideRecord,
        awarded_at: DateTime<Utc>,
    ) -> Option<RewardAward> {
        let points = self.score(ride)?;
        Some(RewardAward {
            user_id: user_id.to_string(),
            ride_id: ride.ride_id.clone(),
            points,
            awarded_at: format_utc_rfc3339(awarded_at),
        })
    }
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new(Arc::new(PointsPerMile::new(1)))
    }
}
