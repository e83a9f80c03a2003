//! Enrolled user model for storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A user enrolled through the provider's authorization flow.
///
/// Written only by enrollment; the poll pipeline treats it as read-only.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque user ID (also used as document ID)
    pub id: String,
    /// Provider-assigned account ID
    pub external_account_id: String,
    /// Long-lived provider refresh token
    pub refresh_token: String,
    /// When the user first enrolled
    pub created_at: String,
    /// When the refresh token was last replaced
    pub updated_at: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("external_account_id", &self.external_account_id)
            .field("refresh_token", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
