// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore, with an in-memory stand-in).
//!
//! The poll pipeline only sees the two traits below; which store backs them
//! is decided once at startup.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{CreditOutcome, RewardAward, User};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Reward awards keyed by `{user_id}:{ride_id}`
    pub const REWARD_AWARDS: &str = "reward_awards";
}

/// Durable store of enrolled users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Snapshot of every enrolled user.
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn find_by_external_id(&self, external_account_id: &str) -> Result<Option<User>>;

    /// Create or replace a user (enrollment only).
    async fn upsert_user(&self, user: &User) -> Result<()>;
}

/// Durable store of awarded points.
#[async_trait]
pub trait RewardLedger: Send + Sync {
    /// Write `award` unless one already exists for its (user_id, ride_id).
    ///
    /// An existing award is left untouched, whatever its points.
    async fn credit_if_absent(&self, award: &RewardAward) -> Result<CreditOutcome>;

    async fn get_award(&self, user_id: &str, ride_id: &str) -> Result<Option<RewardAward>>;

    async fn list_awards_for_user(&self, user_id: &str) -> Result<Vec<RewardAward>>;
}
