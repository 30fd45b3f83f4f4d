//! Concurrent per-connection fetching with all-or-nothing aggregation.
//!
//! One request is issued per connection and the report is returned only after
//! every request has completed, whatever the completion order. A failing
//! connection never aborts its siblings.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use sca_core::{Connection, EncryptedEnvelope};

use crate::error::FetchError;
use crate::registry::ConnectionRegistry;
use crate::transport::{RequestKind, Transport};

/// A connection that failed during a fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFailure {
    pub connection_id: String,
    pub connection_name: String,
    pub error: FetchError,
}

impl ConnectionFailure {
    /// Message shown to the user, if this failure warrants one.
    pub fn user_message(&self) -> Option<String> {
        match self.error {
            FetchError::Generic(_) => Some(format!("Something went wrong ({})", self.connection_name)),
            FetchError::ConnectionNotFound | FetchError::ConnectionRevoked => None,
        }
    }
}

/// Aggregate outcome of one fetch cycle.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Envelopes from every successful connection, stamped with their owner.
    pub envelopes: Vec<EncryptedEnvelope>,
    /// Number of connections that reported back, successfully or not.
    pub responses: usize,
    pub failures: Vec<ConnectionFailure>,
}

/// Issues fetches and applies connection fault side effects.
pub struct SyncFetcher {
    transport: Arc<dyn Transport>,
    registry: Arc<dyn ConnectionRegistry>,
}

impl SyncFetcher {
    pub fn new(transport: Arc<dyn Transport>, registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    /// Fetch `kind` from every connection concurrently and wait for all.
    pub async fn fetch_all(&self, connections: Vec<Connection>, kind: RequestKind) -> FetchReport {
        let mut report = FetchReport::default();
        let mut joins = JoinSet::new();

        for connection in connections {
            let transport = Arc::clone(&self.transport);
            joins.spawn(async move {
                let result = if connection.usable_base_url().is_some() {
                    transport.fetch_list(&connection, kind).await
                } else {
                    Err(FetchError::Generic("connection has no base URL".into()))
                };
                (connection, result)
            });
        }

        while let Some(joined) = joins.join_next().await {
            report.responses += 1;
            let (connection, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Fetch task failed to complete");
                    continue;
                }
            };
            match result {
                Ok(envelopes) => {
                    debug!(
                        connection_id = %connection.id,
                        count = envelopes.len(),
                        kind = kind.path(),
                        "Fetched envelopes"
                    );
                    report.envelopes.extend(
                        envelopes
                            .into_iter()
                            .map(|e| e.owned_by(&connection.id, connection.api_version)),
                    );
                }
                Err(error) => {
                    self.handle_failure(&connection, &error).await;
                    report.failures.push(ConnectionFailure {
                        connection_id: connection.id.clone(),
                        connection_name: connection.name.clone(),
                        error,
                    });
                }
            }
        }

        report
    }

    /// Fetch one authorization from one connection, bypassing aggregation.
    pub async fn fetch_single(
        &self,
        connection: &Connection,
        authorization_id: &str,
    ) -> Result<EncryptedEnvelope, FetchError> {
        let result = if connection.usable_base_url().is_some() {
            self.transport
                .fetch_authorization(connection, authorization_id)
                .await
        } else {
            Err(FetchError::Generic("connection has no base URL".into()))
        };
        match result {
            Ok(envelope) => Ok(envelope.owned_by(&connection.id, connection.api_version)),
            Err(error) => {
                self.handle_failure(connection, &error).await;
                Err(error)
            }
        }
    }

    /// Revoke a consent, applying the same connection fault side effects.
    pub async fn revoke_consent(
        &self,
        connection: &Connection,
        consent_id: &str,
    ) -> Result<(), FetchError> {
        let result = self.transport.revoke_consent(connection, consent_id).await;
        if let Err(error) = &result {
            self.handle_failure(connection, error).await;
        }
        result
    }

    async fn handle_failure(&self, connection: &Connection, error: &FetchError) {
        match error {
            FetchError::ConnectionNotFound => {
                info!(connection_id = %connection.id, "Connection not found on server, marking inactive");
                self.registry.mark_inactive(&connection.id).await;
            }
            FetchError::ConnectionRevoked => {
                if connection.active {
                    info!(connection_id = %connection.id, "Connection revoked, marking inactive");
                    self.registry.mark_inactive(&connection.id).await;
                }
            }
            FetchError::Generic(message) => {
                warn!(
                    connection_id = %connection.id,
                    connection_name = %connection.name,
                    error = %message,
                    "Fetch failed"
                );
            }
        }
    }
}
