//! Encrypted envelopes as delivered by the authorization service.
//!
//! Wire shape per element: `{data, key, iv, connection_id, id}`. Lists arrive
//! wrapped as `{"data": [...]}`, single records as `{"data": {...}}`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::connection::ApiVersion;
use super::flexible_id;
use crate::error::{Error, Result};

/// One encrypted record, alive only between fetch and decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Ciphertext (base64).
    pub data: String,
    /// Wrapped content key (base64).
    pub key: String,
    /// Initialization vector (base64).
    pub iv: String,
    #[serde(default, deserialize_with = "flexible_id::optional")]
    pub connection_id: Option<String>,
    #[serde(
        rename = "id",
        default,
        deserialize_with = "flexible_id::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub entity_id: Option<String>,
    /// Stamped by the fetcher from the owning connection; not on the wire.
    #[serde(skip)]
    pub api_version: ApiVersion,
}

impl EncryptedEnvelope {
    /// Attach the owning connection's identity and protocol version.
    ///
    /// A connection id already present on the wire wins over the fallback.
    #[must_use]
    pub fn owned_by(mut self, connection_id: &str, api_version: ApiVersion) -> Self {
        if self.connection_id.is_none() {
            self.connection_id = Some(connection_id.to_string());
        }
        self.api_version = api_version;
        self
    }
}

#[derive(Deserialize)]
struct ListBody {
    data: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct SingleBody {
    data: EncryptedEnvelope,
}

/// Parse a `{"data": [...]}` list body, skipping malformed elements.
pub fn parse_envelope_list(body: &[u8]) -> Result<Vec<EncryptedEnvelope>> {
    let list: ListBody = serde_json::from_slice(body)
        .map_err(|e| Error::Payload(format!("envelope list: {e}")))?;
    let total = list.data.len();
    let envelopes: Vec<EncryptedEnvelope> = list
        .data
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    if envelopes.len() != total {
        debug!(
            skipped = total - envelopes.len(),
            "Skipped malformed envelopes in list response"
        );
    }
    Ok(envelopes)
}

/// Parse a `{"data": {...}}` single-envelope body.
pub fn parse_envelope(body: &[u8]) -> Result<EncryptedEnvelope> {
    let single: SingleBody =
        serde_json::from_slice(body).map_err(|e| Error::Payload(format!("envelope: {e}")))?;
    Ok(single.data)
}
