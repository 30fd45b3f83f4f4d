//! Scripted transport for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use sca_core::{Connection, EncryptedEnvelope};

use super::{ActionRequest, ActionResponse, RequestKind, Transport};
use crate::error::FetchError;

/// Scripted reply for one connection.
#[derive(Debug, Clone)]
pub struct MockReply<T> {
    pub delay: Duration,
    pub result: Result<T, FetchError>,
}

impl<T> MockReply<T> {
    pub const fn ok(value: T) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(value),
        }
    }

    pub const fn err(error: FetchError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }

    #[must_use]
    pub const fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Transport returning scripted replies keyed by connection id.
#[derive(Debug, Default)]
pub struct MockTransport {
    lists: Mutex<HashMap<String, MockReply<Vec<EncryptedEnvelope>>>>,
    singles: Mutex<HashMap<(String, String), MockReply<EncryptedEnvelope>>>,
    actions: Mutex<HashMap<String, MockReply<ActionResponse>>>,
    revokes: Mutex<HashMap<String, MockReply<()>>>,
    list_calls: Mutex<Vec<(String, RequestKind)>>,
    sent_actions: Mutex<Vec<(String, ActionRequest)>>,
    revoked_consents: Mutex<Vec<(String, String)>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_list(&self, connection_id: &str, reply: MockReply<Vec<EncryptedEnvelope>>) {
        lock(&self.lists).insert(connection_id.to_string(), reply);
    }

    pub fn set_single(
        &self,
        connection_id: &str,
        authorization_id: &str,
        reply: MockReply<EncryptedEnvelope>,
    ) {
        lock(&self.singles).insert(
            (connection_id.to_string(), authorization_id.to_string()),
            reply,
        );
    }

    pub fn set_action(&self, connection_id: &str, reply: MockReply<ActionResponse>) {
        lock(&self.actions).insert(connection_id.to_string(), reply);
    }

    pub fn set_revoke(&self, connection_id: &str, reply: MockReply<()>) {
        lock(&self.revokes).insert(connection_id.to_string(), reply);
    }

    /// Connections a list request was issued for, in call order.
    pub fn list_calls(&self) -> Vec<(String, RequestKind)> {
        lock(&self.list_calls).clone()
    }

    /// Actions sent, in call order.
    pub fn sent_actions(&self) -> Vec<(String, ActionRequest)> {
        lock(&self.sent_actions).clone()
    }

    /// `(connection_id, consent_id)` pairs a revoke was sent for.
    pub fn revoked_consents(&self) -> Vec<(String, String)> {
        lock(&self.revoked_consents).clone()
    }
}

async fn play<T: Clone>(reply: Option<MockReply<T>>) -> Result<T, FetchError> {
    let reply = reply.unwrap_or_else(|| MockReply::err(FetchError::Generic("unscripted".into())));
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    reply.result
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch_list(
        &self,
        connection: &Connection,
        kind: RequestKind,
    ) -> Result<Vec<EncryptedEnvelope>, FetchError> {
        lock(&self.list_calls).push((connection.id.clone(), kind));
        let reply = lock(&self.lists).get(&connection.id).cloned();
        play(reply).await
    }

    async fn fetch_authorization(
        &self,
        connection: &Connection,
        authorization_id: &str,
    ) -> Result<EncryptedEnvelope, FetchError> {
        let reply = lock(&self.singles)
            .get(&(connection.id.clone(), authorization_id.to_string()))
            .cloned();
        play(reply).await
    }

    async fn send_action(
        &self,
        connection: &Connection,
        request: &ActionRequest,
    ) -> Result<ActionResponse, FetchError> {
        lock(&self.sent_actions).push((connection.id.clone(), request.clone()));
        let reply = lock(&self.actions).get(&connection.id).cloned();
        play(reply).await
    }

    async fn revoke_consent(
        &self,
        connection: &Connection,
        consent_id: &str,
    ) -> Result<(), FetchError> {
        lock(&self.revoked_consents).push((connection.id.clone(), consent_id.to_string()));
        let reply = lock(&self.revokes).get(&connection.id).cloned();
        play(reply).await
    }
}
