//! Metrics exposed by the synchronization subsystem.

use metrics::{describe_counter, describe_gauge, gauge};
use valence_chain_types::BlockHeight;

pub const SYNC_RUNS_TOTAL: &str = "sync_runs_total";
pub const SYNC_RESTARTS_TOTAL: &str = "sync_restarts_total";
pub const SYNC_PEER_PENALTIES_TOTAL: &str = "sync_peer_penalties_total";
pub const SYNC_LAST_COMMON_HEIGHT: &str = "sync_last_common_height";

/// Registers metric descriptions with the installed recorder. Call once at
/// process startup.
pub fn register_metrics() {
    describe_counter!(SYNC_RUNS_TOTAL, "Synchronization runs started");
    describe_counter!(SYNC_RESTARTS_TOTAL, "Synchronization attempts restarted from scratch");
    describe_counter!(SYNC_PEER_PENALTIES_TOTAL, "Penalties applied to misbehaving peers");
    describe_gauge!(
        SYNC_LAST_COMMON_HEIGHT,
        "Height of the most recent common block agreed with a peer"
    );
}

#[allow(clippy::as_conversions)]
pub(crate) fn record_common_height(height: BlockHeight) {
    gauge!(SYNC_LAST_COMMON_HEIGHT).set(height.0 as f64);
}
