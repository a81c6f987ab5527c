//! Probe-height computation for the common-block search.

use valence_chain_types::{BlockHeight, Round, RoundSchedule};

#[cfg(test)]
#[path = "probes_test.rs"]
mod probes_test;

/// One probe height per round, newest first: the last height of `round`, of
/// the round before it, and so on, up to `limit` entries or round 1.
///
/// Heights at or below `finalized` are dropped, and whenever that cutoff
/// removed anything the finalized height itself is appended: both chains
/// must share the finalized block, so the probe list always ends on a height
/// the peer can be expected to answer.
pub fn round_probe_heights(
    schedule: &RoundSchedule,
    round: Round,
    limit: u64,
    finalized: BlockHeight,
) -> Vec<BlockHeight> {
    let mut heights = Vec::new();
    let mut current = round;
    let mut remaining = limit;
    while current.0 >= 1 && remaining > 0 {
        heights.push(schedule.last_height(current));
        current = Round(current.0 - 1);
        remaining -= 1;
    }

    let unfiltered = heights.len();
    heights.retain(|height| *height > finalized);
    if heights.len() != unfiltered {
        heights.push(finalized);
    }
    heights
}

/// Up to `count` consecutive heights walking down from `tip`, stopping above
/// height zero. Fast chain switching probes every height near the tip rather
/// than one per round.
pub fn recent_probe_heights(tip: BlockHeight, count: u64) -> Vec<BlockHeight> {
    let mut heights = Vec::new();
    let mut current = tip;
    for _ in 0..count {
        if current.0 == 0 {
            break;
        }
        heights.push(current);
        current = current.saturating_sub(1);
    }
    heights
}
