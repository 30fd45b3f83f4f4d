//! `sca-sync` daemon
//!
//! Polls every linked connection for pending authorizations, keeps the merged
//! list in memory and logs every change observers would see.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::{debug, info, warn};

use sca_core::{Clock, Connection, ConsentData, SystemClock};
use sca_crypto::ConnectionKeyPair;
use sca_sync::decrypt::Keyring;
use sca_sync::engine::SyncEngine;
use sca_sync::fetcher::SyncFetcher;
use sca_sync::registry::InMemoryRegistry;
use sca_sync::transport::HttpTransport;
use sca_sync::{AuthorizationStore, LifecycleEvent, PollScheduler, SyncEvent};

#[derive(Parser, Debug)]
#[command(name = "sca-sync")]
#[command(version, about = "SCA authenticator sync daemon - polls and merges pending authorizations")]
struct Args {
    /// JSON file with the linked connections and their base64 X25519 secret keys
    #[arg(long, env = "SCA_CONNECTIONS")]
    connections: PathBuf,

    /// Explicit settings file (overrides the global one)
    #[arg(long, env = "SCA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, env = "SCA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SCA_LOG_JSON")]
    log_json: bool,

    /// Fetch consents once, print them as JSON and exit.
    #[arg(long)]
    consents: bool,

    /// Revoke one consent and exit.
    #[arg(long, num_args = 2, value_names = ["CONNECTION_ID", "CONSENT_ID"])]
    revoke_consent: Option<Vec<String>>,
}

/// One entry of the connections file.
#[derive(Debug, Deserialize)]
struct ConnectionEntry {
    #[serde(flatten)]
    connection: Connection,
    secret_key: String,
}

fn load_connections(path: &Path) -> anyhow::Result<(Vec<Connection>, Keyring)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read connections file {}", path.display()))?;
    let entries: Vec<ConnectionEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse connections file {}", path.display()))?;

    let mut keyring = Keyring::new();
    let mut connections = Vec::with_capacity(entries.len());
    for entry in entries {
        let keypair = ConnectionKeyPair::from_secret_base64(&entry.secret_key)
            .with_context(|| format!("Invalid secret key for connection {}", entry.connection.id))?;
        debug!(
            connection_id = %entry.connection.id,
            fingerprint = %keypair.fingerprint(),
            "Loaded connection key"
        );
        keyring.insert(entry.connection.id.clone(), keypair);
        connections.push(entry.connection);
    }
    Ok((connections, keyring))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = sca_core::config::load_config(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json |= args.log_json;

    let log_filter = format!("sca_sync={}", config.logging.level);
    sca_core::tracing_init::init_tracing(&log_filter, config.logging.json);

    let (connections, keyring) = load_connections(&args.connections)?;
    if keyring.is_empty() {
        warn!("No connections configured, nothing will be polled");
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        connections = connections.len(),
        keys = keyring.len(),
        poll_interval_secs = config.sync.poll_interval_secs,
        final_ttl_secs = config.sync.final_ttl_secs,
        "Starting sca-sync"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(InMemoryRegistry::new(connections));
    let transport = Arc::new(HttpTransport::new(&config.http)?);
    let store = Arc::new(AuthorizationStore::new(
        clock,
        config.sync.final_ttl(),
        config.sync.event_capacity,
    ));
    let engine = Arc::new(SyncEngine::new(
        SyncFetcher::new(transport, registry.clone()),
        registry,
        Arc::new(keyring),
        Arc::clone(&store),
    ));

    if let Some([connection_id, consent_id]) = args.revoke_consent.as_deref() {
        engine
            .revoke_consent(connection_id, consent_id)
            .await
            .with_context(|| format!("Failed to revoke consent {consent_id}"))?;
        return Ok(());
    }

    if args.consents {
        let consents = engine.list_consents().await;
        info!(count = consents.len(), "Fetched consents");
        return print_consents(&consents);
    }

    let events_handle = spawn_event_logger(Arc::clone(&store));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let expiry_handle = spawn_expiry_timer(
        Arc::clone(&engine),
        config.sync.expiry_check_interval(),
        shutdown_rx,
    );

    let scheduler = PollScheduler::new(engine, config.sync.poll_interval());
    scheduler.handle(LifecycleEvent::ListAttached).await;
    scheduler.handle(LifecycleEvent::Foreground).await;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C shutdown signal");

    scheduler.stop().await;
    let _ = shutdown_tx.send(true);
    let _ = expiry_handle.await;
    events_handle.abort();

    info!("sca-sync stopped");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_consents(consents: &[ConsentData]) -> anyhow::Result<()> {
    for consent in consents {
        println!("{}", serde_json::to_string(consent)?);
    }
    Ok(())
}

/// Log every observer event the store publishes.
fn spawn_event_logger(store: Arc<AuthorizationStore>) -> tokio::task::JoinHandle<()> {
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SyncEvent::DataChanged) => {
                    let records = store.snapshot().await;
                    info!(count = records.len(), "Authorizations changed");
                    for record in &records {
                        debug!(
                            key = %record.key,
                            status = %record.status,
                            title = %record.title,
                            "Authorization"
                        );
                    }
                }
                Ok(SyncEvent::PresentError(message)) => warn!(%message, "User-facing error"),
                Ok(event) => info!(?event, "Sync event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

/// Time out overdue authorizations and drop records past retention on a
/// fixed cadence.
fn spawn_expiry_timer(
    engine: Arc<SyncEngine>,
    interval: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    engine.expire_overdue().await;
                    engine.store().prune().await;
                }
                _ = shutdown.changed() => {
                    debug!("Expiry timer shutting down");
                    return;
                }
            }
        }
    })
}
