//! Data model shared by the fetcher, the decryptor and the store.

mod authorization;
mod connection;
mod consent;
mod envelope;

pub use authorization::{
    AuthorizationData, AuthorizationDataV1, AuthorizationDataV2, AuthorizationKey,
    AuthorizationRecord, AuthorizationStatus, ServerStatus,
};
pub use connection::{ApiVersion, Connection};
pub use consent::{ConsentAccount, ConsentData};
pub use envelope::{EncryptedEnvelope, parse_envelope, parse_envelope_list};

/// Serde helpers for identifiers the server sends either as strings or integers.
pub(crate) mod flexible_id {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
    }

    impl From<RawId> for String {
        fn from(raw: RawId) -> Self {
            match raw {
                RawId::Text(s) => s,
                RawId::Int(n) => n.to_string(),
            }
        }
    }

    pub fn required<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        RawId::deserialize(deserializer).map(String::from)
    }

    pub fn optional<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
    }
}
