//! SCA Authenticator Sync Library
//!
//! Keeps the in-memory list of pending authorizations in step with every
//! linked connection:
//! - Concurrent per-connection fetching with fault classification
//! - Envelope decryption and merge into a single observable store
//! - Retention of final and expired records
//! - Poll scheduling driven by lifecycle events
//! - Confirm/deny dispatch for both protocol versions

pub mod decrypt;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod reaper;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use dispatcher::{ActionDispatcher, ActionOutcome, LocationPolicy, NoLocationRequirement};
pub use engine::SyncEngine;
pub use error::{FetchError, SyncError};
pub use events::SyncEvent;
pub use scheduler::{LifecycleEvent, PollScheduler};
pub use store::AuthorizationStore;
