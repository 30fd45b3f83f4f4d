//! Confirm/deny dispatch with optimistic `Processing` state.

use std::sync::Arc;

use tracing::{debug, info, warn};

use sca_core::{ApiVersion, AuthorizationKey, AuthorizationStatus, Connection};

use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::registry::ConnectionRegistry;
use crate::store::AuthorizationStore;
use crate::transport::{Action, ActionRequest, ActionResponse, Transport};

/// Decides whether geolocation must be disclosed before acting.
pub trait LocationPolicy: Send + Sync {
    /// `true` when the user still has to grant location access for `connection`.
    fn requires_warning(&self, connection: &Connection) -> bool;
}

/// Policy for deployments without a geolocation requirement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocationRequirement;

impl LocationPolicy for NoLocationRequirement {
    fn requires_warning(&self, _connection: &Connection) -> bool {
        false
    }
}

/// What happened to an authorization after a confirm/deny call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Nothing was sent; observers were asked to show the location warning.
    LocationWarning,
    /// The record reached this final status.
    Finalized(AuthorizationStatus),
    /// The server accepted the action but has not finished it yet.
    AwaitingServer,
}

/// Sends user decisions and applies their outcome to the store.
pub struct ActionDispatcher {
    transport: Arc<dyn Transport>,
    registry: Arc<dyn ConnectionRegistry>,
    store: Arc<AuthorizationStore>,
    location: Arc<dyn LocationPolicy>,
}

impl ActionDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<dyn ConnectionRegistry>,
        store: Arc<AuthorizationStore>,
        location: Arc<dyn LocationPolicy>,
    ) -> Self {
        Self {
            transport,
            registry,
            store,
            location,
        }
    }

    pub async fn confirm(&self, key: &AuthorizationKey) -> Result<ActionOutcome, SyncError> {
        self.dispatch(key, Action::Confirm).await
    }

    pub async fn deny(&self, key: &AuthorizationKey) -> Result<ActionOutcome, SyncError> {
        self.dispatch(key, Action::Deny).await
    }

    async fn dispatch(
        &self,
        key: &AuthorizationKey,
        action: Action,
    ) -> Result<ActionOutcome, SyncError> {
        let record = self
            .store
            .get(key)
            .await
            .ok_or_else(|| SyncError::RecordNotFound(key.clone()))?;
        if !record.status.is_pending() {
            return Err(SyncError::NotActionable(key.clone()));
        }

        let connection = self
            .registry
            .connection(&key.connection_id)
            .await
            .ok_or_else(|| SyncError::UnknownConnection(key.connection_id.clone()))?;
        if !connection.active || connection.usable_base_url().is_none() {
            return Err(SyncError::UnusableConnection(connection.id));
        }

        if self.location.requires_warning(&connection) {
            self.store.emit(SyncEvent::RequestLocationWarning);
            return Ok(ActionOutcome::LocationWarning);
        }

        let record = self.store.mark_processing(key).await?;
        let request = ActionRequest {
            authorization_id: key.authorization_id.clone(),
            authorization_code: record.authorization_code,
            action,
        };
        info!(%key, ?action, version = %record.api_version, "Sending authorization action");

        let status = match self.transport.send_action(&connection, &request).await {
            Ok(ActionResponse::V1) => action.final_status(),
            // A final reply settles the record as the requested action.
            Ok(ActionResponse::V2 { status })
                if record.api_version == ApiVersion::V2 && !status.is_final() =>
            {
                debug!(%key, ?status, "Action accepted, awaiting server");
                return Ok(ActionOutcome::AwaitingServer);
            }
            Ok(ActionResponse::V2 { .. }) => action.final_status(),
            Err(e) => {
                warn!(%key, error = %e, "Authorization action failed");
                AuthorizationStatus::Error
            }
        };

        if self.store.set_final(key, status).await {
            self.store.schedule_close(key.clone());
            return Ok(ActionOutcome::Finalized(status));
        }
        // Cleared or finalized by a poll while the request was in flight.
        match self.store.get(key).await {
            Some(current) if current.status.is_final() => Ok(ActionOutcome::Finalized(current.status)),
            _ => Err(SyncError::RecordNotFound(key.clone())),
        }
    }
}
