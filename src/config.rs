// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything the poll pipeline needs (OAuth client credentials, worker
//! count, retry and timeout knobs) lives in one explicit value that is
//! passed down at startup rather than read from globals.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Default size of the poll worker pool.
pub const DEFAULT_POLL_WORKERS: usize = 5;

/// Where users and reward awards are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    /// Process-local maps, lost on restart. For local development.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StorageBackend::Firestore),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ConfigError::Invalid(format!(
                "STORAGE_BACKEND must be 'firestore' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone, Validate)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Lyft OAuth client ID (public)
    pub lyft_client_id: String,
    /// Base URL of the Lyft API (overridable for tests and sandboxes)
    pub lyft_api_base: String,
    /// Storage backend for users and the reward ledger
    pub storage_backend: StorageBackend,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    // --- Poll pipeline ---
    /// Number of concurrent poll workers
    #[validate(range(min = 1, max = 64))]
    pub poll_workers: usize,
    /// Attempts per provider call, including the first one
    #[validate(range(min = 1, max = 10))]
    pub provider_max_attempts: u32,
    /// First retry delay; doubled on each further attempt
    pub provider_retry_base: Duration,
    /// Per-request HTTP timeout for provider calls
    pub provider_timeout: Duration,
    /// Upper bound for a whole poll cycle
    pub cycle_timeout: Duration,
    /// Rate used by the default linear reward policy
    pub points_per_mile: u32,

    // --- Secrets ---
    /// Lyft OAuth client secret
    pub lyft_client_secret: String,
    /// HMAC key for signing the OAuth state parameter
    #[validate(length(min = 32))]
    pub oauth_state_key: Vec<u8>,
    /// Bearer token required to trigger a poll cycle
    #[validate(length(min = 16))]
    pub poll_trigger_token: String,
}

impl Config {
    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            lyft_client_id: "test_client_id".to_string(),
            lyft_api_base: "http://127.0.0.1:9".to_string(),
            storage_backend: StorageBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            poll_workers: DEFAULT_POLL_WORKERS,
            provider_max_attempts: 3,
            provider_retry_base: Duration::from_millis(1),
            provider_timeout: Duration::from_secs(5),
            cycle_timeout: Duration::from_secs(60),
            points_per_mile: 10,
            lyft_client_secret: "test_secret".to_string(),
            oauth_state_key: b"test_oauth_state_key_32_bytes_min!".to_vec(),
            poll_trigger_token: "test_poll_trigger_token".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let config = Self {
            lyft_client_id: env::var("LYFT_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("LYFT_CLIENT_ID"))?,
            lyft_api_base: env::var("LYFT_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "https://api.lyft.com".to_string()),
            storage_backend: env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "firestore".to_string())
                .parse()?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,

            poll_workers: parse_or("POLL_WORKERS", DEFAULT_POLL_WORKERS)?,
            provider_max_attempts: parse_or("PROVIDER_MAX_ATTEMPTS", 3)?,
            provider_retry_base: Duration::from_millis(parse_or("PROVIDER_RETRY_BASE_MS", 500)?),
            provider_timeout: Duration::from_secs(parse_or("PROVIDER_TIMEOUT_SECS", 30)?),
            cycle_timeout: Duration::from_secs(parse_or("CYCLE_TIMEOUT_SECS", 900)?),
            points_per_mile: parse_or("POINTS_PER_MILE", 1)?,

            lyft_client_secret: env::var("LYFT_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("LYFT_CLIENT_SECRET"))?,
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
            poll_trigger_token: env::var("POLL_TRIGGER_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("POLL_TRIGGER_TOKEN"))?,
        };

        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(config)
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{} is not a valid number: '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
