use serde::{Deserialize, Serialize};
use validator::Validate;
use valence_chain_types::RoundSchedule;

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

/// Consensus parameters of the chain. Everything the finality engine sizes
/// itself by derives from the active delegate count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct BftConfig {
    /// Number of active delegates, i.e. forging slots per round.
    #[validate(range(min = 1))]
    pub round_length: u64,
}

impl Default for BftConfig {
    fn default() -> Self {
        Self { round_length: 101 }
    }
}

impl BftConfig {
    /// Span of heights over which a header still contributes pre-votes:
    /// `3 * round_length - 1`.
    pub fn processing_window(&self) -> u64 {
        3 * self.round_length - 1
    }

    /// Header window capacity: `5 * round_length`.
    pub fn window_capacity(&self) -> u64 {
        5 * self.round_length
    }

    /// Maximum height gap a fast chain switch may bridge: `2 * round_length`.
    pub fn fast_switch_window(&self) -> u64 {
        2 * self.round_length
    }

    /// Number of slots after which an unmoved finalized height counts as
    /// stale and full synchronization applies: `3 * round_length`.
    pub fn stale_finality_slots(&self) -> u64 {
        3 * self.round_length
    }

    pub fn round_schedule(&self) -> RoundSchedule {
        RoundSchedule::new(self.round_length)
    }
}
