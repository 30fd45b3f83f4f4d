//! Connection registry seam.
//!
//! Persistence lives outside the engine. The engine only reads snapshots of
//! active connections and asks the registry to retire a connection.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use sca_core::Connection;

/// Source of connections and sink for the single mutation the engine makes.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Snapshot of connections that take part in fetch cycles.
    async fn active_connections(&self) -> Vec<Connection>;

    /// Look up one connection regardless of its active flag.
    async fn connection(&self, id: &str) -> Option<Connection>;

    /// Exclude a connection from subsequent fetch cycles.
    async fn mark_inactive(&self, id: &str);
}

/// Registry held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    connections: RwLock<Vec<Connection>>,
    writes: AtomicUsize,
}

impl InMemoryRegistry {
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            connections: RwLock::new(connections),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `mark_inactive` calls that changed a connection.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryRegistry {
    async fn active_connections(&self) -> Vec<Connection> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect()
    }

    async fn connection(&self, id: &str) -> Option<Connection> {
        self.connections
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    async fn mark_inactive(&self, id: &str) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.iter_mut().find(|c| c.id == id)
            && connection.active
        {
            connection.active = false;
            self.writes.fetch_add(1, Ordering::Relaxed);
            info!(connection_id = id, "Connection marked inactive");
        }
    }
}
