// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User enrollment through the Lyft authorization-code flow.

use crate::db::UserDirectory;
use crate::error::{AppError, ProviderError, Result};
use crate::models::User;
use crate::services::lyft::LyftClient;
use crate::services::rides::AccessToken;
use crate::time_utils::format_utc_rfc3339;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

/// Turns an authorization code into an enrolled user.
#[derive(Clone)]
pub struct EnrollmentService {
    lyft: LyftClient,
    directory: Arc<dyn UserDirectory>,
}

impl EnrollmentService {
    pub fn new(lyft: LyftClient, directory: Arc<dyn UserDirectory>) -> Self {
        Self { lyft, directory }
    }

    pub fn authorize_url(&self, state: &str) -> String {
        self.lyft.authorize_url(state)
    }

    /// Exchange the code, look up the provider account and store the user.
    ///
    /// Re-enrolling an account already on file replaces its refresh token
    /// and keeps its user ID, so earned awards stay attached.
    pub async fn handle_callback(&self, code: &str) -> Result<User> {
        let tokens = self.lyft.exchange_code(code).await?;

        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            ProviderError::Malformed("token response has no refresh_token (offline scope missing?)".to_string())
        })?;

        let profile = self
            .lyft
            .get_profile(&AccessToken::new(tokens.access_token))
            .await?;

        let now = format_utc_rfc3339(chrono::Utc::now());
        let user = match self.directory.find_by_external_id(&profile.id).await? {
            Some(existing) => User {
                refresh_token,
                updated_at: now,
                ..existing
            },
            None => User {
                id: new_user_id()?,
                external_account_id: profile.id,
                refresh_token,
                created_at: now.clone(),
                updated_at: now,
            },
        };

        self.directory.upsert_user(&user).await?;

        tracing::info!(
            user_id = %user.id,
            external_account_id = %user.external_account_id,
            "User enrolled"
        );

        Ok(user)
    }
}

/// Random 128-bit user ID, hex encoded.
pub fn new_user_id() -> Result<String> {
    random_hex::<16>()
}

/// `N` random bytes from the system CSPRNG, hex encoded.
pub(crate) fn random_hex<const N: usize>() -> Result<String> {
    let mut bytes = [0u8; N];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
    Ok(hex::encode(bytes))
}
