//! Authorization store: the single owner of the in-memory record collection.
//!
//! Every mutation goes through this type and is followed by an observer
//! event. Poll results are merged with [`AuthorizationStore::update`], which
//! is guarded by a generation counter so a fetch issued before a
//! [`clear`](AuthorizationStore::clear) can never repopulate the collection.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};

use sca_core::{
    ApiVersion, AuthorizationData, AuthorizationKey, AuthorizationRecord, AuthorizationStatus,
    Clock,
};
use time::OffsetDateTime;

use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::reaper;

#[derive(Debug, Default)]
struct StoreState {
    generation: u64,
    records: Vec<AuthorizationRecord>,
}

/// Shared, observable collection of authorization records.
#[derive(Debug)]
pub struct AuthorizationStore {
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
    final_ttl: std::time::Duration,
    events: broadcast::Sender<SyncEvent>,
}

impl AuthorizationStore {
    pub fn new(clock: Arc<dyn Clock>, final_ttl: std::time::Duration, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: RwLock::new(StoreState::default()),
            clock,
            final_ttl,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub const fn final_ttl(&self) -> std::time::Duration {
        self.final_ttl
    }

    fn ttl(&self) -> time::Duration {
        time::Duration::try_from(self.final_ttl).unwrap_or(time::Duration::MAX)
    }

    /// Current generation; capture it before issuing a fetch.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Copy of the collection, sorted by creation time.
    pub async fn snapshot(&self) -> Vec<AuthorizationRecord> {
        self.state.read().await.records.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    pub async fn get(&self, key: &AuthorizationKey) -> Option<AuthorizationRecord> {
        self.state
            .read()
            .await
            .records
            .iter()
            .find(|r| &r.key == key)
            .cloned()
    }

    pub async fn index_of(&self, key: &AuthorizationKey) -> Option<usize> {
        self.state
            .read()
            .await
            .records
            .iter()
            .position(|r| &r.key == key)
    }

    /// Merge one poll cycle's decrypted authorizations.
    ///
    /// Returns `true` and emits [`SyncEvent::DataChanged`] when the collection
    /// changed. Results fetched under an older generation are discarded.
    pub async fn update(&self, generation: u64, fetched: &[AuthorizationData]) -> bool {
        let now = self.clock.now();
        let ttl = self.ttl();
        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!(
                fetched_generation = generation,
                current_generation = state.generation,
                "Discarding stale fetch result"
            );
            return false;
        }

        // An empty cycle carries no evidence against live records.
        let merged = if fetched.is_empty() {
            state.records.clone()
        } else {
            reconcile(&state.records, fetched, now)
        };
        let next = reaper::prune(merged, now, ttl);
        if next == state.records {
            return false;
        }
        debug!(
            before = state.records.len(),
            after = next.len(),
            "Authorization collection changed"
        );
        state.records = next;
        drop(state);
        self.emit(SyncEvent::DataChanged);
        true
    }

    /// Drop every record and invalidate in-flight fetches.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.generation = state.generation.wrapping_add(1);
        state.records.clear();
        drop(state);
        self.emit(SyncEvent::DataChanged);
    }

    /// Drop live records of connections that are no longer active.
    ///
    /// Final records stay until their retention window elapses.
    pub async fn retain_connections(&self, generation: u64, active: &HashSet<String>) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        let before = state.records.len();
        state
            .records
            .retain(|r| r.status.is_final() || active.contains(&r.key.connection_id));
        let dropped = before - state.records.len();
        drop(state);
        if dropped > 0 {
            info!(dropped, "Dropped authorizations of inactive connections");
            self.emit(SyncEvent::DataChanged);
        }
        dropped > 0
    }

    /// Insert or refresh a single decrypted authorization.
    ///
    /// The same derivation rules as a poll cycle apply: expired and foreign
    /// final authorizations are not materialized, and a record that is no
    /// longer pending is never overwritten. A fetch issued under an older
    /// generation is discarded.
    pub async fn upsert(&self, generation: u64, data: &AuthorizationData) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!(key = %data.key(), "Discarding stale single fetch");
            return false;
        }
        let Some(record) = derive(&state.records, std::slice::from_ref(data), data.api_version(), now)
            .into_iter()
            .next()
        else {
            return false;
        };

        if let Some(existing) = state.records.iter_mut().find(|r| r.key == record.key) {
            if *existing == record {
                return false;
            }
            *existing = record;
        } else {
            state.records.push(record);
            state.records.sort_by_key(|r| r.created_at);
        }
        drop(state);
        self.emit(SyncEvent::DataChanged);
        true
    }

    /// Move a pending record to `Processing` and return the updated copy.
    pub async fn mark_processing(
        &self,
        key: &AuthorizationKey,
    ) -> Result<AuthorizationRecord, SyncError> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .iter_mut()
            .find(|r| &r.key == key)
            .ok_or_else(|| SyncError::RecordNotFound(key.clone()))?;
        if !record.mark_processing() {
            return Err(SyncError::NotActionable(key.clone()));
        }
        let updated = record.clone();
        drop(state);
        self.emit(SyncEvent::DataChanged);
        Ok(updated)
    }

    /// Apply a final status in place. No-op for absent or already final records.
    pub async fn set_final(&self, key: &AuthorizationKey, status: AuthorizationStatus) -> bool {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let changed = state
            .records
            .iter_mut()
            .find(|r| &r.key == key)
            .is_some_and(|r| r.set_final(status, now));
        drop(state);
        if changed {
            info!(%key, %status, "Authorization finalized");
            self.emit(SyncEvent::DataChanged);
        }
        changed
    }

    pub async fn remove(&self, key: &AuthorizationKey) -> bool {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|r| &r.key != key);
        let removed = state.records.len() != before;
        drop(state);
        if removed {
            self.emit(SyncEvent::DataChanged);
        }
        removed
    }

    /// Run the retention pass outside of a poll cycle.
    pub async fn prune(&self) -> bool {
        let now = self.clock.now();
        let ttl = self.ttl();
        let mut state = self.state.write().await;
        let before = state.records.len();
        let records = std::mem::take(&mut state.records);
        state.records = reaper::prune(records, now, ttl);
        let changed = state.records.len() != before;
        drop(state);
        if changed {
            self.emit(SyncEvent::DataChanged);
        }
        changed
    }

    /// Remove a final record once the retention window elapses and tell
    /// observers to close it.
    pub fn schedule_close(self: &Arc<Self>, key: AuthorizationKey) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(store.final_ttl).await;
            let is_final = store.get(&key).await.is_some_and(|r| r.status.is_final());
            if is_final && store.remove(&key).await {
                debug!(%key, "Closed finalized authorization");
                store.emit(SyncEvent::ShouldClose(key));
            }
        });
    }
}

/// Records derived from one version's fetched authorizations.
fn derive(
    existing: &[AuthorizationRecord],
    fetched: &[AuthorizationData],
    version: ApiVersion,
    now: OffsetDateTime,
) -> Vec<AuthorizationRecord> {
    let mut seen = HashSet::new();
    let mut derived = Vec::new();

    for data in fetched.iter().filter(|d| d.api_version() == version) {
        let key = data.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        let current = existing.iter().find(|r| r.key == key);

        if let Some(status) = data.server_final_status() {
            // Finalized elsewhere; only an existing live record can take it.
            if let Some(record) = current.filter(|r| !r.status.is_final() && !r.is_expired(now)) {
                let mut record = record.clone();
                record.set_final(status, now);
                derived.push(record);
            }
            continue;
        }

        if data.expires_at() < now {
            continue;
        }
        match current {
            Some(record) if !record.status.is_pending() => derived.push(record.clone()),
            _ => derived.push(AuthorizationRecord::from_data(data)),
        }
    }
    derived
}

/// Carry forward existing records the server stopped returning once they are
/// no longer pending or have expired.
fn merge_forward(
    mut fresh: Vec<AuthorizationRecord>,
    existing: &[AuthorizationRecord],
    version: ApiVersion,
    now: OffsetDateTime,
) -> Vec<AuthorizationRecord> {
    let fresh_keys: HashSet<AuthorizationKey> = fresh.iter().map(|r| r.key.clone()).collect();
    fresh.extend(
        existing
            .iter()
            .filter(|r| r.api_version == version)
            .filter(|r| !r.status.is_pending() || r.is_expired(now))
            .filter(|r| !fresh_keys.contains(&r.key))
            .cloned(),
    );
    fresh
}

/// Merge fetched authorizations into `existing`, sorted by creation time.
pub fn reconcile(
    existing: &[AuthorizationRecord],
    fetched: &[AuthorizationData],
    now: OffsetDateTime,
) -> Vec<AuthorizationRecord> {
    let mut merged = Vec::new();
    for version in [ApiVersion::V1, ApiVersion::V2] {
        let fresh = derive(existing, fetched, version, now);
        merged.extend(merge_forward(fresh, existing, version, now));
    }
    merged.sort_by_key(|r| r.created_at);
    merged
}
