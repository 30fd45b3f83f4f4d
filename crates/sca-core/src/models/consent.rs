//! Decrypted consent payloads.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::flexible_id;

/// Account covered by a consent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentAccount {
    pub name: String,
    #[serde(default)]
    pub account_number: Option<String>,
}

/// A consent granted to a third-party provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentData {
    #[serde(deserialize_with = "flexible_id::required")]
    pub id: String,
    #[serde(deserialize_with = "flexible_id::required")]
    pub connection_id: String,
    pub tpp_name: String,
    pub consent_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(default)]
    pub accounts: Vec<ConsentAccount>,
}

impl ConsentData {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}
