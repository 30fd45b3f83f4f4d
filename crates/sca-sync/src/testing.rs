//! Fixtures shared by unit and integration tests.

use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use sca_core::{ApiVersion, Connection, EncryptedEnvelope};
use sca_crypto::ConnectionKeyPair;

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}

/// Active connection pointing at a placeholder host.
pub fn connection(id: &str, api_version: ApiVersion) -> Connection {
    Connection {
        id: id.to_string(),
        name: format!("Bank {id}"),
        base_url: Some(format!("https://{id}.bank.test")),
        access_token: format!("token-{id}"),
        api_version,
        active: true,
    }
}

/// Plaintext of a v1 authorization living `lifetime_secs` from `created_at`.
pub fn v1_payload(
    connection_id: &str,
    id: &str,
    created_at: OffsetDateTime,
    lifetime_secs: i64,
) -> serde_json::Value {
    json!({
        "id": id,
        "connection_id": connection_id,
        "title": "Payment confirmation",
        "description": "Transfer 100.00 EUR",
        "authorization_code": format!("code-{id}"),
        "created_at": rfc3339(created_at),
        "expires_at": rfc3339(created_at + Duration::seconds(lifetime_secs)),
    })
}

/// Plaintext of a v2 authorization carrying a server `status`.
pub fn v2_payload(
    connection_id: &str,
    id: &str,
    created_at: OffsetDateTime,
    lifetime_secs: i64,
    status: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "connection_id": connection_id,
        "title": "Login",
        "description": {"text": "Sign in to online banking"},
        "created_at": rfc3339(created_at),
        "expires_at": rfc3339(created_at + Duration::seconds(lifetime_secs)),
        "status": status,
    })
}

/// Seal `payload` for `keypair` the way the service would deliver it.
///
/// Panics if sealing fails; test-only.
#[allow(clippy::expect_used)]
pub fn sealed_authorization(
    keypair: &ConnectionKeyPair,
    api_version: ApiVersion,
    payload: &serde_json::Value,
) -> EncryptedEnvelope {
    let plaintext = serde_json::to_vec(payload).expect("serialize payload");
    let sealed = sca_crypto::seal(&plaintext, keypair.public_key()).expect("seal payload");
    let connection_id = payload["connection_id"].as_str().map(str::to_string);
    let entity_id = payload["id"].as_str().map(str::to_string);
    EncryptedEnvelope {
        data: sealed.data,
        key: sealed.key,
        iv: sealed.iv,
        connection_id,
        entity_id,
        api_version,
    }
}
