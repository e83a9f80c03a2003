// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (enrolled accounts and their refresh tokens)
//! - Reward awards (one document per credited ride)

use crate::db::{collections, RewardLedger, UserDirectory};
use crate::error::{AppError, Result};
use crate::models::reward::ledger_key;
use crate::models::{CreditOutcome, RewardAward, User};
use async_trait::async_trait;
use firestore::errors::FirestoreError;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // The emulator accepts any bearer token, so skip real credentials
        // rather than picking up whatever is on the developer machine.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore (emulator)");

        Ok(Self { client })
    }
}

// ─── User Operations ─────────────────────────────────────────

#[async_trait]
impl UserDirectory for FirestoreDb {
    async fn list_users(&self) -> Result<Vec<User>> {
        self.client
            .fluent()
            .select()
            .from(collections::USERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_external_id(&self, external_account_id: &str) -> Result<Option<User>> {
        let external_account_id = external_account_id.to_string();
        let users: Vec<User> = self
            .client
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| {
                q.field("external_account_id")
                    .eq(external_account_id.clone())
            })
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(users.into_iter().next())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(&user.id)
            .object(user)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

// ─── Reward Ledger Operations ────────────────────────────────

#[async_trait]
impl RewardLedger for FirestoreDb {
    /// Uses a document *create*, which Firestore rejects with ALREADY_EXISTS
    /// when the key is taken. No read-then-write window between workers.
    async fn credit_if_absent(&self, award: &RewardAward) -> Result<CreditOutcome> {
        let result: std::result::Result<RewardAward, FirestoreError> = self
            .client
            .fluent()
            .insert()
            .into(collections::REWARD_AWARDS)
            .document_id(award.ledger_key())
            .object(award)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(CreditOutcome::Created),
            Err(FirestoreError::DataConflictError(_)) => {
                tracing::debug!(
                    user_id = %award.user_id,
                    ride_id = %award.ride_id,
                    "Award already credited (idempotent skip)"
                );
                Ok(CreditOutcome::AlreadyExists)
            }
            Err(e) => Err(AppError::Database(format!("Failed to credit award: {}", e))),
        }
    }

    async fn get_award(&self, user_id: &str, ride_id: &str) -> Result<Option<RewardAward>> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::REWARD_AWARDS)
            .obj()
            .one(&ledger_key(user_id, ride_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_awards_for_user(&self, user_id: &str) -> Result<Vec<RewardAward>> {
        let user_id = user_id.to_string();
        let mut awards: Vec<RewardAward> = self
            .client
            .fluent()
            .select()
            .from(collections::REWARD_AWARDS)
            .filter(move |q| q.field("user_id").eq(user_id.clone()))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Sorted here to avoid needing a composite index.
        awards.sort_by(|a, b| a.ride_id.cmp(&b.ride_id));
        Ok(awards)
    }
}
