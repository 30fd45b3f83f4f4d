//! Retention of final and expired authorizations.
//!
//! A record that reached a final state, or whose expiry passed, stays visible
//! for one retention window and is then dropped from the collection.

use time::{Duration, OffsetDateTime};

use sca_core::AuthorizationRecord;

/// Whether `record` has outlived its retention window at `now`.
pub fn is_stale(record: &AuthorizationRecord, now: OffsetDateTime, ttl: Duration) -> bool {
    let finalized_long_ago = record.status.is_final()
        && record
            .action_time
            .is_some_and(|acted_at| now - acted_at >= ttl);
    let expired_long_ago = record.is_expired(now) && now - record.expires_at >= ttl;
    finalized_long_ago || expired_long_ago
}

/// Drop stale records, preserving the order of the rest.
pub fn prune(
    records: Vec<AuthorizationRecord>,
    now: OffsetDateTime,
    ttl: Duration,
) -> Vec<AuthorizationRecord> {
    records
        .into_iter()
        .filter(|record| !is_stale(record, now, ttl))
        .collect()
}
