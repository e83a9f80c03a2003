// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Poll trigger: runs one full cycle over the user directory.

use crate::db::UserDirectory;
use crate::error::{AppError, Result};
use crate::models::{CycleResult, PollWindow};
use crate::services::dispatcher::BatchDispatcher;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Runs poll cycles, one at a time.
#[derive(Clone)]
pub struct PollService {
    directory: Arc<dyn UserDirectory>,
    dispatcher: BatchDispatcher,
    worker_count: usize,
    cycle_timeout: Duration,
    /// Held for the duration of a cycle.
    running: Arc<Mutex<()>>,
}

impl PollService {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        dispatcher: BatchDispatcher,
        worker_count: usize,
        cycle_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            dispatcher,
            worker_count,
            cycle_timeout,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Run one cycle over yesterday's rides (UTC) for every enrolled user.
    ///
    /// Cancelling `shutdown`, or exceeding the cycle timeout, stops the
    /// in-flight workers; the result still accounts for every user.
    pub async fn run_cycle(
        &self,
        now: DateTime<Utc>,
        shutdown: &CancellationToken,
    ) -> Result<CycleResult> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| AppError::Conflict("a poll cycle is already running".to_string()))?;

        let window = PollWindow::previous_utc_day(now);
        let users = self.directory.list_users().await?;

        // Child token: the timeout cancels this cycle only, shutdown cancels all.
        let cancel = shutdown.child_token();
        let timer = {
            let cancel = cancel.clone();
            let timeout = self.cycle_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                tracing::warn!(timeout_secs = timeout.as_secs(), "Poll cycle timed out, cancelling");
                cancel.cancel();
            })
        };

        let result = self
            .dispatcher
            .run_cycle(users, self.worker_count, window, &cancel)
            .await;

        timer.abort();
        Ok(result)
    }
}
