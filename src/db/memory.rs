// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local store for development and tests.

use crate::db::{RewardLedger, UserDirectory};
use crate::error::Result;
use crate::models::reward::ledger_key;
use crate::models::{CreditOutcome, RewardAward, User};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory user directory and reward ledger.
///
/// Clones share the same maps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<String, User>>,
    awards: Arc<DashMap<String, RewardAward>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All awards, sorted by ledger key.
    pub fn all_awards(&self) -> Vec<RewardAward> {
        let mut awards: Vec<(String, RewardAward)> = self
            .awards
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        awards.sort_by(|a, b| a.0.cmp(&b.0));
        awards.into_iter().map(|(_, award)| award).collect()
    }

    pub fn total_points(&self, user_id: &str) -> u64 {
        self.awards
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().points)
            .sum()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn find_by_external_id(&self, external_account_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|e| e.value().external_account_id == external_account_id)
            .map(|e| e.value().clone()))
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl RewardLedger for MemoryStore {
    async fn credit_if_absent(&self, award: &RewardAward) -> Result<CreditOutcome> {
        // The entry holds the shard lock, so check-and-insert is atomic.
        match self.awards.entry(award.ledger_key()) {
            Entry::Occupied(_) => Ok(CreditOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(award.clone());
                Ok(CreditOutcome::Created)
            }
        }
    }

    async fn get_award(&self, user_id: &str, ride_id: &str) -> Result<Option<RewardAward>> {
        Ok(self
            .awards
            .get(&ledger_key(user_id, ride_id))
            .map(|e| e.value().clone()))
    }

    async fn list_awards_for_user(&self, user_id: &str) -> Result<Vec<RewardAward>> {
        let mut awards: Vec<RewardAward> = self
            .awards
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        awards.sort_by(|a, b| a.ride_id.cmp(&b.ride_id));
        Ok(awards)
    }
}
