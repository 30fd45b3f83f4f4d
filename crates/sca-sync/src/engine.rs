//! Fetch → decrypt → merge pipeline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use sca_core::{AuthorizationData, AuthorizationKey, AuthorizationStatus, Clock, ConsentData};

use crate::decrypt::{Decryptor, decrypt_authorizations, decrypt_consents};
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::fetcher::{FetchReport, SyncFetcher};
use crate::registry::ConnectionRegistry;
use crate::store::AuthorizationStore;
use crate::transport::RequestKind;

/// Message shown when a focused authorization is not in the collection.
pub const NOT_FOUND_MESSAGE: &str = "Authorization not found";

/// Drives one sync cycle end to end and owns the pending focus target.
pub struct SyncEngine {
    fetcher: SyncFetcher,
    registry: Arc<dyn ConnectionRegistry>,
    decryptor: Arc<dyn Decryptor>,
    store: Arc<AuthorizationStore>,
    focus: Mutex<Option<AuthorizationKey>>,
}

impl SyncEngine {
    pub fn new(
        fetcher: SyncFetcher,
        registry: Arc<dyn ConnectionRegistry>,
        decryptor: Arc<dyn Decryptor>,
        store: Arc<AuthorizationStore>,
    ) -> Self {
        Self {
            fetcher,
            registry,
            decryptor,
            store,
            focus: Mutex::new(None),
        }
    }

    pub const fn store(&self) -> &Arc<AuthorizationStore> {
        &self.store
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        self.store.clock()
    }

    /// Run one poll cycle. Returns whether the collection changed.
    pub async fn refresh(&self) -> bool {
        let generation = self.store.generation().await;
        let connections = self.registry.active_connections().await;

        let fetched = if connections.is_empty() {
            Vec::new()
        } else {
            let report = self
                .fetcher
                .fetch_all(connections, RequestKind::Authorizations)
                .await;
            self.report_failures(&report);
            self.decrypt(report).await
        };

        // Fetch failures may have retired connections since the snapshot.
        let active: HashSet<String> = self
            .registry
            .active_connections()
            .await
            .into_iter()
            .map(|c| c.id)
            .collect();
        let merged = self.store.update(generation, &fetched).await;
        let retained = self.store.retain_connections(generation, &active).await;

        if self.store.generation().await != generation {
            debug!("Collection cleared during refresh, focus left pending");
            return false;
        }
        self.resolve_focus().await;
        merged || retained
    }

    fn report_failures(&self, report: &FetchReport) {
        for failure in &report.failures {
            if let Some(message) = failure.user_message() {
                self.store.emit(SyncEvent::PresentError(message));
            }
        }
    }

    /// Decrypt off the async workers; the merge happens back on the caller.
    async fn decrypt(&self, report: FetchReport) -> Vec<AuthorizationData> {
        let decryptor = Arc::clone(&self.decryptor);
        let envelopes = report.envelopes;
        let total = envelopes.len();
        if total == 0 {
            return Vec::new();
        }
        match tokio::task::spawn_blocking(move || decrypt_authorizations(decryptor.as_ref(), &envelopes))
            .await
        {
            Ok(decoded) => {
                if decoded.len() < total {
                    debug!(dropped = total - decoded.len(), "Dropped undecryptable envelopes");
                }
                decoded
            }
            Err(e) => {
                warn!(error = %e, "Decryption task failed");
                Vec::new()
            }
        }
    }

    /// Bring `key` into view after the next merge.
    pub fn focus(&self, key: AuthorizationKey) {
        *self.focus.lock().unwrap_or_else(PoisonError::into_inner) = Some(key);
    }

    async fn resolve_focus(&self) {
        let Some(key) = self
            .focus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        match self.store.index_of(&key).await {
            Some(index) => self.store.emit(SyncEvent::ScrollToIndex(index)),
            None => {
                debug!(%key, "Focused authorization not present");
                self.store.emit(SyncEvent::PresentError(NOT_FOUND_MESSAGE.to_string()));
            }
        }
    }

    /// Fetch, decrypt and insert exactly one authorization.
    pub async fn load_single(&self, key: &AuthorizationKey) -> Result<bool, SyncError> {
        let generation = self.store.generation().await;
        let connection = self
            .registry
            .connection(&key.connection_id)
            .await
            .ok_or_else(|| SyncError::UnknownConnection(key.connection_id.clone()))?;

        let envelope = self
            .fetcher
            .fetch_single(&connection, &key.authorization_id)
            .await?;

        let decryptor = Arc::clone(&self.decryptor);
        let decoded = tokio::task::spawn_blocking(move || {
            decrypt_authorizations(decryptor.as_ref(), std::slice::from_ref(&envelope))
        })
        .await
        .unwrap_or_default();

        let Some(data) = decoded.into_iter().next() else {
            debug!(%key, "Single authorization could not be decrypted");
            return Ok(false);
        };
        Ok(self.store.upsert(generation, &data).await)
    }

    /// Fetch consents from every active connection, dropping expired ones.
    pub async fn list_consents(&self) -> Vec<ConsentData> {
        let connections = self.registry.active_connections().await;
        if connections.is_empty() {
            return Vec::new();
        }
        let report = self.fetcher.fetch_all(connections, RequestKind::Consents).await;
        self.report_failures(&report);

        let decryptor = Arc::clone(&self.decryptor);
        let envelopes = report.envelopes;
        let mut consents =
            tokio::task::spawn_blocking(move || decrypt_consents(decryptor.as_ref(), &envelopes))
                .await
                .unwrap_or_default();

        let now = self.clock().now();
        consents.retain(|c| !c.is_expired(now));
        consents.sort_by_key(|c| c.created_at);
        consents
    }

    /// Revoke one consent on its connection's service.
    pub async fn revoke_consent(&self, connection_id: &str, consent_id: &str) -> Result<(), SyncError> {
        let connection = self
            .registry
            .connection(connection_id)
            .await
            .ok_or_else(|| SyncError::UnknownConnection(connection_id.to_string()))?;
        if !connection.active || connection.usable_base_url().is_none() {
            return Err(SyncError::UnusableConnection(connection.id));
        }
        self.fetcher.revoke_consent(&connection, consent_id).await?;
        info!(connection_id, consent_id, "Consent revoked");
        Ok(())
    }

    /// Externally detected expiry: finalize as timed out and schedule close.
    pub async fn mark_timed_out(&self, key: &AuthorizationKey) -> bool {
        let changed = self.store.set_final(key, AuthorizationStatus::TimedOut).await;
        if changed {
            self.store.schedule_close(key.clone());
        }
        changed
    }

    /// Time out every pending record whose expiry has passed.
    pub async fn expire_overdue(&self) -> usize {
        let now = self.clock().now();
        let overdue: Vec<_> = self
            .store
            .snapshot()
            .await
            .into_iter()
            .filter(|r| r.status.is_pending() && r.is_expired(now))
            .map(|r| r.key)
            .collect();

        let mut count = 0;
        for key in &overdue {
            if self.mark_timed_out(key).await {
                count += 1;
            }
        }
        if count > 0 {
            info!(count, "Timed out overdue authorizations");
        }
        count
    }
}
