//! Observer events published by the store and the engine.

use sca_core::AuthorizationKey;

/// Discrete notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The record collection changed; re-read the snapshot.
    DataChanged,
    /// Bring the record at this index into view.
    ScrollToIndex(usize),
    /// Show a user-facing error message.
    PresentError(String),
    /// Geolocation disclosure is required before the action can be sent.
    RequestLocationWarning,
    /// The record reached its final state and its retention window elapsed.
    ShouldClose(AuthorizationKey),
}
