#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! Integration tests for the sync pipeline.
//!
//! A fake bank seals real payloads with each connection's public key, so the
//! full flow runs: fetch → decrypt → merge → dispatch → retention.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use sca_core::models::ServerStatus;
use sca_core::{
    ApiVersion, AuthorizationKey, AuthorizationStatus, Clock, Connection, EncryptedEnvelope,
    ManualClock,
};
use sca_crypto::ConnectionKeyPair;
use sca_sync::decrypt::Keyring;
use sca_sync::engine::SyncEngine;
use sca_sync::fetcher::SyncFetcher;
use sca_sync::registry::{ConnectionRegistry, InMemoryRegistry};
use sca_sync::transport::{ActionRequest, ActionResponse, RequestKind, Transport};
use sca_sync::{
    ActionDispatcher, ActionOutcome, AuthorizationStore, FetchError, NoLocationRequirement,
    SyncError, SyncEvent,
};

/// Server-side view of one connection.
#[derive(Default)]
struct Account {
    feed: Vec<serde_json::Value>,
    failure: Option<FetchError>,
    action_reply: Option<serde_json::Value>,
}

/// In-process stand-in for the authorization service.
struct FakeBank {
    keys: HashMap<String, ConnectionKeyPair>,
    accounts: Mutex<HashMap<String, Account>>,
}

impl FakeBank {
    fn new(keys: HashMap<String, ConnectionKeyPair>) -> Self {
        Self {
            keys,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    fn with_account<R>(&self, connection_id: &str, f: impl FnOnce(&mut Account) -> R) -> R {
        let mut accounts = self.accounts.lock().unwrap();
        f(accounts.entry(connection_id.to_string()).or_default())
    }

    fn seal(&self, connection_id: &str, payload: &serde_json::Value) -> EncryptedEnvelope {
        let recipient = self.keys[connection_id].public_key();
        let sealed = sca_crypto::seal(&serde_json::to_vec(payload).unwrap(), recipient).unwrap();
        EncryptedEnvelope {
            data: sealed.data,
            key: sealed.key,
            iv: sealed.iv,
            connection_id: Some(connection_id.to_string()),
            entity_id: payload["id"].as_str().map(str::to_string),
            api_version: ApiVersion::default(),
        }
    }
}

#[async_trait]
impl Transport for FakeBank {
    async fn fetch_list(
        &self,
        connection: &Connection,
        kind: RequestKind,
    ) -> Result<Vec<EncryptedEnvelope>, FetchError> {
        assert_eq!(kind, RequestKind::Authorizations);
        let (feed, failure) = self.with_account(&connection.id, |a| (a.feed.clone(), a.failure.clone()));
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(feed.iter().map(|p| self.seal(&connection.id, p)).collect())
    }

    async fn fetch_authorization(
        &self,
        connection: &Connection,
        authorization_id: &str,
    ) -> Result<EncryptedEnvelope, FetchError> {
        let feed = self.with_account(&connection.id, |a| a.feed.clone());
        feed.iter()
            .find(|p| p["id"] == authorization_id)
            .map(|p| self.seal(&connection.id, p))
            .ok_or_else(|| FetchError::Generic("not found".into()))
    }

    async fn send_action(
        &self,
        connection: &Connection,
        _request: &ActionRequest,
    ) -> Result<ActionResponse, FetchError> {
        let reply = self.with_account(&connection.id, |a| a.action_reply.clone());
        match connection.api_version {
            // Any 2xx counts for v1; the body is not inspected.
            ApiVersion::V1 => Ok(ActionResponse::V1),
            ApiVersion::V2 => {
                let status = reply
                    .and_then(|r| serde_json::from_value::<ServerStatus>(r["status"].clone()).ok())
                    .unwrap_or(ServerStatus::Unknown);
                Ok(ActionResponse::V2 { status })
            }
        }
    }

    async fn revoke_consent(
        &self,
        connection: &Connection,
        _consent_id: &str,
    ) -> Result<(), FetchError> {
        match self.with_account(&connection.id, |a| a.failure.clone()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap()
}

fn authorization(connection_id: &str, id: &str, now: OffsetDateTime, status: Option<&str>) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "connection_id": connection_id,
        "title": "Confirm payment",
        "description": "Card payment 42.00 EUR",
        "authorization_code": "code-1",
        "created_at": rfc3339(now),
        "expires_at": rfc3339(now + time::Duration::seconds(60)),
    });
    if let Some(status) = status {
        payload["status"] = json!(status);
    }
    payload
}

struct Harness {
    bank: Arc<FakeBank>,
    registry: Arc<InMemoryRegistry>,
    clock: Arc<ManualClock>,
    engine: Arc<SyncEngine>,
    dispatcher: ActionDispatcher,
}

fn harness(connections: &[(&str, ApiVersion)]) -> Harness {
    let keys: HashMap<String, ConnectionKeyPair> = connections
        .iter()
        .map(|(id, _)| ((*id).to_string(), ConnectionKeyPair::generate()))
        .collect();
    let mut keyring = Keyring::new();
    for (id, kp) in &keys {
        keyring.insert(id.clone(), kp.clone());
    }

    let bank = Arc::new(FakeBank::new(keys));
    let registry = Arc::new(InMemoryRegistry::new(
        connections
            .iter()
            .map(|(id, version)| Connection {
                id: (*id).to_string(),
                name: format!("Bank {id}"),
                base_url: Some(format!("https://{id}.example.com/")),
                access_token: "token".into(),
                api_version: *version,
                active: true,
            })
            .collect(),
    ));
    let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc().replace_nanosecond(0).unwrap()));
    let store = Arc::new(AuthorizationStore::new(
        clock.clone() as Arc<dyn Clock>,
        std::time::Duration::from_secs(4),
        64,
    ));
    let engine = Arc::new(SyncEngine::new(
        SyncFetcher::new(bank.clone(), registry.clone()),
        registry.clone(),
        Arc::new(keyring),
        Arc::clone(&store),
    ));
    let dispatcher = ActionDispatcher::new(
        bank.clone(),
        registry.clone(),
        store,
        Arc::new(NoLocationRequirement),
    );
    Harness {
        bank,
        registry,
        clock,
        engine,
        dispatcher,
    }
}

#[tokio::test]
async fn one_healthy_and_one_revoked_connection() {
    let h = harness(&[("c1", ApiVersion::V1), ("c2", ApiVersion::V1)]);
    let now = h.clock.now();
    h.bank
        .with_account("c1", |a| a.feed.push(authorization("c1", "a1", now, None)));
    h.bank
        .with_account("c2", |a| a.failure = Some(FetchError::ConnectionRevoked));

    assert!(h.engine.refresh().await);

    let records = h.engine.store().snapshot().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, AuthorizationKey::new("c1", "a1"));
    assert_eq!(records[0].status, AuthorizationStatus::Pending);
    assert_eq!(records[0].lifetime_seconds(), 60);

    assert!(!h.registry.connection("c2").await.unwrap().active);
    assert_eq!(h.registry.write_count(), 1);
}

#[tokio::test]
async fn v2_confirmation_completes_on_next_poll() {
    let h = harness(&[("c1", ApiVersion::V2)]);
    let now = h.clock.now();
    h.bank.with_account("c1", |a| {
        a.feed.push(authorization("c1", "77", now, Some("pending")));
        a.action_reply = Some(json!({"authorization_id": "77", "status": "confirm_processing"}));
    });
    h.engine.refresh().await;
    let key = AuthorizationKey::new("c1", "77");

    let outcome = h.dispatcher.confirm(&key).await.unwrap();
    assert_eq!(outcome, ActionOutcome::AwaitingServer);
    assert_eq!(
        h.engine.store().get(&key).await.unwrap().status,
        AuthorizationStatus::Processing
    );

    // Server still reports it in progress: nothing reverts.
    h.bank.with_account("c1", |a| a.feed[0]["status"] = json!("confirm_processing"));
    h.engine.refresh().await;
    assert_eq!(
        h.engine.store().get(&key).await.unwrap().status,
        AuthorizationStatus::Processing
    );

    h.clock.advance(time::Duration::seconds(1));
    h.bank.with_account("c1", |a| a.feed[0]["status"] = json!("confirmed"));
    assert!(h.engine.refresh().await);

    let records = h.engine.store().snapshot().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuthorizationStatus::Confirmed);
    assert_eq!(records[0].action_time, Some(h.clock.now()));
}

#[tokio::test]
async fn v1_confirm_ends_confirmed_and_survives_polls_until_ttl() {
    let h = harness(&[("c1", ApiVersion::V1)]);
    let now = h.clock.now();
    h.bank
        .with_account("c1", |a| a.feed.push(authorization("c1", "a1", now, None)));
    h.engine.refresh().await;
    let key = AuthorizationKey::new("c1", "a1");

    let outcome = h.dispatcher.confirm(&key).await.unwrap();
    assert_eq!(
        outcome,
        ActionOutcome::Finalized(AuthorizationStatus::Confirmed)
    );

    // The server drops the record after the action; it stays visible as final.
    h.bank.with_account("c1", |a| a.feed.clear());
    h.clock.advance(time::Duration::seconds(3));
    h.engine.refresh().await;
    assert_eq!(
        h.engine.store().get(&key).await.unwrap().status,
        AuthorizationStatus::Confirmed
    );

    // A stale feed still listing it as pending does not revert it.
    h.bank
        .with_account("c1", |a| a.feed.push(authorization("c1", "a1", now, None)));
    h.engine.refresh().await;
    assert_eq!(
        h.engine.store().get(&key).await.unwrap().status,
        AuthorizationStatus::Confirmed
    );

    h.clock.advance(time::Duration::seconds(1));
    h.engine.refresh().await;
    assert!(h.engine.store().get(&key).await.is_none());
}

#[tokio::test]
async fn focus_and_single_load() {
    let h = harness(&[("c1", ApiVersion::V1)]);
    let now = h.clock.now();
    h.bank
        .with_account("c1", |a| a.feed.push(authorization("c1", "a9", now, None)));
    let mut events = h.engine.store().subscribe();

    let key = AuthorizationKey::new("c1", "a9");
    assert!(h.engine.load_single(&key).await.unwrap());
    assert_eq!(events.recv().await.unwrap(), SyncEvent::DataChanged);

    h.engine.focus(key.clone());
    h.engine.refresh().await;
    assert_eq!(events.recv().await.unwrap(), SyncEvent::ScrollToIndex(0));
}

#[tokio::test]
async fn revoked_connection_takes_its_authorizations_with_it() {
    let h = harness(&[("c1", ApiVersion::V1)]);
    let now = h.clock.now();
    h.bank
        .with_account("c1", |a| a.feed.push(authorization("c1", "a1", now, None)));
    h.engine.refresh().await;
    let key = AuthorizationKey::new("c1", "a1");
    assert!(h.engine.store().get(&key).await.is_some());

    h.bank
        .with_account("c1", |a| a.failure = Some(FetchError::ConnectionRevoked));
    for _ in 0..3 {
        h.clock.advance(time::Duration::seconds(3));
        h.engine.refresh().await;
    }
    assert!(h.registry.active_connections().await.is_empty());
    assert!(h.engine.store().is_empty().await);

    assert!(matches!(
        h.dispatcher.confirm(&key).await,
        Err(SyncError::RecordNotFound(_))
    ));
    assert!(matches!(
        h.engine.revoke_consent("c1", "k1").await,
        Err(SyncError::UnusableConnection(_))
    ));
}
