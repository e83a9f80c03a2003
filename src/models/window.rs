// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! The date window a poll cycle covers.

use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::Serialize;

/// Half-open UTC time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PollWindow {
    /// The previous UTC calendar day relative to `now`.
    pub fn previous_utc_day(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let end = today.and_time(NaiveTime::MIN).and_utc();
        // Only fails at the very start of chrono's date range.
        let start = end.checked_sub_days(Days::new(1)).unwrap_or(end);
        Self { start, end }
    }
}
