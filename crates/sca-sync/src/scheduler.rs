//! Poll scheduler driven by an interval ticker and lifecycle events.
//!
//! States are `Stopped` (initial) and `Running`. `start` is a no-op while
//! running. `stop` halts the ticker and clears the store right away; a fetch
//! already in flight is left to finish and its result is discarded by the
//! store's generation check.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::engine::SyncEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// External lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application came to the foreground.
    Foreground,
    /// The application went to the background.
    Background,
    /// The authorization list became the visible screen.
    ListAttached,
    /// The authorization list is no longer visible.
    ListDetached,
}

#[derive(Debug)]
struct Inner {
    state: SchedulerState,
    foreground: bool,
    list_visible: bool,
    shutdown: Option<watch::Sender<bool>>,
}

pub struct PollScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    inner: Mutex<Inner>,
}

impl PollScheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            inner: Mutex::new(Inner {
                state: SchedulerState::Stopped,
                foreground: false,
                list_visible: false,
                shutdown: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state
    }

    pub const fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Begin polling. The first cycle runs immediately.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.state == SchedulerState::Running {
            debug!("Poll scheduler already running");
            return;
        }
        let (tx, rx) = watch::channel(false);
        inner.shutdown = Some(tx);
        inner.state = SchedulerState::Running;
        drop(inner);

        spawn_ticker(Arc::clone(&self.engine), self.interval, rx);
        info!(interval_ms = self.interval.as_millis(), "Poll scheduler started");
    }

    /// Stop polling and clear the collection. Safe to call repeatedly.
    pub async fn stop(&self) {
        let shutdown = {
            let mut inner = self.lock();
            inner.state = SchedulerState::Stopped;
            inner.shutdown.take()
        };
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
            info!("Poll scheduler stopped");
        }
        self.engine.store().clear().await;
    }

    /// Run one cycle if the scheduler is running.
    pub async fn tick(&self) -> bool {
        if self.state() != SchedulerState::Running {
            return false;
        }
        self.engine.refresh().await
    }

    /// Apply a lifecycle event: poll only while foregrounded with the list visible.
    pub async fn handle(&self, event: LifecycleEvent) {
        let should_run = {
            let mut inner = self.lock();
            match event {
                LifecycleEvent::Foreground => inner.foreground = true,
                LifecycleEvent::Background => inner.foreground = false,
                LifecycleEvent::ListAttached => inner.list_visible = true,
                LifecycleEvent::ListDetached => inner.list_visible = false,
            }
            inner.foreground && inner.list_visible
        };
        debug!(?event, should_run, "Lifecycle event");
        if should_run {
            self.start();
        } else {
            self.stop().await;
        }
    }
}

fn spawn_ticker(
    engine: Arc<SyncEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    // Runs to completion even if shutdown fires meanwhile.
                    engine.refresh().await;
                }
                _ = shutdown.changed() => {
                    debug!("Poll ticker shutting down");
                    return;
                }
            }
        }
    })
}
