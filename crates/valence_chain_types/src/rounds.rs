use serde::{Deserialize, Serialize};

use crate::block::BlockHeight;

#[cfg(test)]
#[path = "rounds_test.rs"]
mod rounds_test;

/// A 1-based round number; round `r` spans `round_length` consecutive
/// heights. Round 0 is the sentinel counterpart of height 0.
#[derive(
    derive_more::Display,
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Round(pub u64);

/// Height arithmetic over fixed-length rounds.
///
/// This only maps heights to round boundaries; which delegates forge in a
/// given round is decided by the roster collaborator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RoundSchedule {
    /// Number of forging slots per round, i.e. the active delegate count.
    /// Must be positive.
    pub round_length: u64,
}

impl RoundSchedule {
    pub fn new(round_length: u64) -> Self {
        Self { round_length }
    }

    /// The round containing `height`; heights `1..=round_length` map to
    /// round 1.
    pub fn round_of(&self, height: BlockHeight) -> Round {
        Round(height.0.div_ceil(self.round_length))
    }

    /// The first height of `round`: `(r - 1) * round_length + 1`.
    pub fn first_height(&self, round: Round) -> BlockHeight {
        BlockHeight(round.0.saturating_sub(1).saturating_mul(self.round_length) + 1)
    }

    /// The last height of `round`: `r * round_length`.
    pub fn last_height(&self, round: Round) -> BlockHeight {
        BlockHeight(round.0.saturating_mul(self.round_length))
    }
}
