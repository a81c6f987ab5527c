use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "vote_threshold_test.rs"]
mod vote_threshold_test;

/// The fraction of the active delegate set whose implicit votes confirm a
/// height: two thirds, rounded up. Both the pre-vote and the pre-commit
/// tallies are measured against it.
pub const FINALITY_THRESHOLD: VoteThreshold = VoteThreshold { numerator: 2, denominator: 3 };

/// A ratio threshold over vote counts. `is_met(count, total)` holds when
/// `count >= ceil(total * numerator / denominator)`; with 2/3 and a delegate
/// set of 11 that means 8 votes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteThreshold {
    numerator: u64,
    denominator: u64,
}

impl VoteThreshold {
    pub fn new(numerator: u64, denominator: u64) -> Self {
        assert!(denominator > 0, "Denominator must be greater than zero");
        assert!(denominator >= numerator, "Denominator must be greater than or equal to numerator");
        Self { numerator, denominator }
    }

    pub fn is_met(&self, count: u64, total: u64) -> bool {
        count.checked_mul(self.denominator).expect("Numeric overflow")
            >= total.checked_mul(self.numerator).expect("Numeric overflow")
    }

    /// The smallest count that meets the threshold for `total` voters.
    pub fn required_count(&self, total: u64) -> u64 {
        total.checked_mul(self.numerator).expect("Numeric overflow").div_ceil(self.denominator)
    }
}
