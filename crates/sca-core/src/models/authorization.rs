//! Authorization payloads and the in-memory record built from them.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::connection::ApiVersion;
use super::envelope::EncryptedEnvelope;
use super::flexible_id;
use crate::error::{Error, Result};

/// Local state of an authorization record.
///
/// `Pending` is the only pre-action state, `Processing` is transitional and
/// everything else is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Pending,
    Processing,
    Confirmed,
    Denied,
    Error,
    TimedOut,
    Unavailable,
}

impl AuthorizationStatus {
    pub const fn is_final(self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }

    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Confirmed => "confirmed",
            Self::Denied => "denied",
            Self::Error => "error",
            Self::TimedOut => "timed_out",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Status reported by a v2 server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Pending,
    Processing,
    ConfirmProcessing,
    DenyProcessing,
    Confirmed,
    Denied,
    Error,
    TimeOut,
    Unavailable,
    #[serde(other)]
    Unknown,
}

impl ServerStatus {
    pub const fn is_final(self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Denied | Self::Error | Self::TimeOut | Self::Unavailable
        )
    }

    /// Local status a final server status maps to. `None` for non-final ones.
    pub const fn final_status(self) -> Option<AuthorizationStatus> {
        match self {
            Self::Confirmed => Some(AuthorizationStatus::Confirmed),
            Self::Denied => Some(AuthorizationStatus::Denied),
            Self::Error => Some(AuthorizationStatus::Error),
            Self::TimeOut => Some(AuthorizationStatus::TimedOut),
            Self::Unavailable => Some(AuthorizationStatus::Unavailable),
            _ => None,
        }
    }
}

/// Decrypted v1 authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDataV1 {
    #[serde(deserialize_with = "flexible_id::required")]
    pub id: String,
    #[serde(deserialize_with = "flexible_id::required")]
    pub connection_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authorization_code: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Decrypted v2 authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationDataV2 {
    pub id: String,
    pub connection_id: String,
    pub title: String,
    pub description: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub status: ServerStatus,
}

/// v2 payloads may omit ids that the envelope already carries.
#[derive(Deserialize)]
struct AuthorizationDataV2Wire {
    #[serde(default, deserialize_with = "flexible_id::optional")]
    id: Option<String>,
    #[serde(default, deserialize_with = "flexible_id::optional")]
    connection_id: Option<String>,
    title: String,
    #[serde(default)]
    description: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    expires_at: OffsetDateTime,
    status: ServerStatus,
}

/// A decrypted authorization, tagged by protocol version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationData {
    V1(AuthorizationDataV1),
    V2(AuthorizationDataV2),
}

impl AuthorizationData {
    /// Decode the plaintext of `envelope` according to its protocol version.
    pub fn decode(envelope: &EncryptedEnvelope, plaintext: &[u8]) -> Result<Self> {
        match envelope.api_version {
            ApiVersion::V1 => Ok(Self::V1(serde_json::from_slice(plaintext)?)),
            ApiVersion::V2 => {
                let wire: AuthorizationDataV2Wire = serde_json::from_slice(plaintext)?;
                let id = wire
                    .id
                    .or_else(|| envelope.entity_id.clone())
                    .ok_or_else(|| Error::Payload("v2 authorization without id".into()))?;
                let connection_id = wire
                    .connection_id
                    .or_else(|| envelope.connection_id.clone())
                    .ok_or_else(|| Error::Payload("v2 authorization without connection".into()))?;
                Ok(Self::V2(AuthorizationDataV2 {
                    id,
                    connection_id,
                    title: wire.title,
                    description: wire.description,
                    created_at: wire.created_at,
                    expires_at: wire.expires_at,
                    status: wire.status,
                }))
            }
        }
    }

    pub const fn api_version(&self) -> ApiVersion {
        match self {
            Self::V1(_) => ApiVersion::V1,
            Self::V2(_) => ApiVersion::V2,
        }
    }

    pub fn key(&self) -> AuthorizationKey {
        match self {
            Self::V1(d) => AuthorizationKey::new(&d.connection_id, &d.id),
            Self::V2(d) => AuthorizationKey::new(&d.connection_id, &d.id),
        }
    }

    pub const fn created_at(&self) -> OffsetDateTime {
        match self {
            Self::V1(d) => d.created_at,
            Self::V2(d) => d.created_at,
        }
    }

    pub const fn expires_at(&self) -> OffsetDateTime {
        match self {
            Self::V1(d) => d.expires_at,
            Self::V2(d) => d.expires_at,
        }
    }

    /// Final status reported by a v2 server. v1 never reports one.
    pub const fn server_final_status(&self) -> Option<AuthorizationStatus> {
        match self {
            Self::V1(_) => None,
            Self::V2(d) => d.status.final_status(),
        }
    }
}

/// Identity of a record: unique only as a `(connection, authorization)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorizationKey {
    pub connection_id: String,
    pub authorization_id: String,
}

impl AuthorizationKey {
    pub fn new(connection_id: &str, authorization_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            authorization_id: authorization_id.to_string(),
        }
    }
}

impl std::fmt::Display for AuthorizationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.connection_id, self.authorization_id)
    }
}

/// In-memory view state of one authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationRecord {
    pub key: AuthorizationKey,
    pub api_version: ApiVersion,
    pub title: String,
    pub description: String,
    /// Sent back with v1 confirm/deny requests.
    pub authorization_code: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub status: AuthorizationStatus,
    /// Set when the record becomes final.
    #[serde(with = "time::serde::rfc3339::option")]
    pub action_time: Option<OffsetDateTime>,
}

impl AuthorizationRecord {
    /// Build a fresh pending record from a decrypted payload.
    pub fn from_data(data: &AuthorizationData) -> Self {
        let (title, description, authorization_code) = match data {
            AuthorizationData::V1(d) => (
                d.title.clone(),
                d.description.clone(),
                d.authorization_code.clone(),
            ),
            AuthorizationData::V2(d) => {
                let description = match &d.description {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                (d.title.clone(), description, None)
            }
        };
        Self {
            key: data.key(),
            api_version: data.api_version(),
            title,
            description,
            authorization_code,
            created_at: data.created_at(),
            expires_at: data.expires_at(),
            status: AuthorizationStatus::Pending,
            action_time: None,
        }
    }

    /// Total lifetime, used for progress display.
    pub fn lifetime_seconds(&self) -> i64 {
        (self.expires_at - self.created_at).whole_seconds()
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Move a pending record to `Processing`. Returns `false` otherwise.
    pub fn mark_processing(&mut self) -> bool {
        if self.status.is_pending() {
            self.status = AuthorizationStatus::Processing;
            true
        } else {
            false
        }
    }

    /// Apply a final status exactly once.
    ///
    /// Returns `false` without touching the record if it is already final or
    /// `status` is not a final status.
    pub fn set_final(&mut self, status: AuthorizationStatus, now: OffsetDateTime) -> bool {
        if self.status.is_final() || !status.is_final() {
            return false;
        }
        self.status = status;
        self.action_time = Some(now);
        true
    }
}
