use serde::{Deserialize, Serialize};
use validator::Validate;

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

/// Configuration of the synchronizer and its mechanisms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SyncConfig {
    /// Block ids per common-block probe request.
    #[validate(range(min = 1))]
    pub common_block_ids_per_request: u64,
    /// Probe round-trips before the common-block search gives up.
    #[validate(range(min = 1))]
    pub max_common_block_requests: u64,
    /// Blocks per fetch while replaying a peer's chain.
    #[validate(range(min = 1))]
    pub blocks_per_fetch: u64,
    /// Controlled restarts per synchronization run before giving up.
    pub max_restarts: u64,
    /// Penalty score applied to a misbehaving peer.
    pub penalty_score: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            common_block_ids_per_request: 10,
            max_common_block_requests: 10,
            blocks_per_fetch: 10,
            max_restarts: 3,
            penalty_score: 100,
        }
    }
}
