use valence_chain_types::{BlockHeader, BlockHeight, SlotSchedule};

#[cfg(test)]
#[path = "fork_choice_test.rs"]
mod fork_choice_test;

/// How a candidate block relates to the current chain tip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::IntoStaticStr)]
pub enum ForkStatus {
    /// The candidate is the tip itself.
    Identical,
    /// The candidate extends the tip by one height.
    ValidBlock,
    /// The tip's delegate produced a competing block at the same height off
    /// the same parent; the duplicate is never applied.
    DoubleForging,
    /// A competing sibling of the tip wins the deterministic tiebreak; the
    /// caller must revert the tip and apply the candidate.
    TieBreak,
    /// The candidate plausibly heads a better chain; synchronization should
    /// be triggered.
    DifferentChain,
    /// None of the above; the candidate is safely ignored.
    Discard,
}

/// The (height, max_height_prevoted) summary of a chain tip. Peer tips, for
/// which no full header is available, go through the same different-chain
/// predicate as local headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TipSummary {
    pub height: BlockHeight,
    pub max_height_prevoted: BlockHeight,
}

impl From<&BlockHeader> for TipSummary {
    fn from(header: &BlockHeader) -> Self {
        Self { height: header.height, max_height_prevoted: header.max_height_prevoted }
    }
}

/// Classifies `candidate` against `tip`. Pure; first matching status wins and
/// all side effects (reverting, syncing) belong to the caller.
pub fn classify(candidate: &BlockHeader, tip: &BlockHeader, slots: &SlotSchedule) -> ForkStatus {
    if candidate.id == tip.id {
        return ForkStatus::Identical;
    }
    if is_valid_successor(candidate, tip) {
        return ForkStatus::ValidBlock;
    }
    if is_double_forging(candidate, tip) {
        return ForkStatus::DoubleForging;
    }
    if is_tie_break(candidate, tip, slots) {
        return ForkStatus::TieBreak;
    }
    if is_different_chain(tip.into(), candidate.into()) {
        return ForkStatus::DifferentChain;
    }
    ForkStatus::Discard
}

pub fn is_valid_successor(candidate: &BlockHeader, tip: &BlockHeader) -> bool {
    candidate.previous_id == tip.id && candidate.height == tip.height.unchecked_next()
}

pub fn is_double_forging(candidate: &BlockHeader, tip: &BlockHeader) -> bool {
    candidate.height == tip.height
        && candidate.delegate == tip.delegate
        && candidate.previous_id == tip.previous_id
        && candidate.max_height_prevoted == tip.max_height_prevoted
}

/// A competing sibling wins over the tip when its id sorts lower, or when the
/// tip itself arrived after its forging slot had ended. Locally forged tips
/// carry no receipt stamp and never count as late.
pub fn is_tie_break(candidate: &BlockHeader, tip: &BlockHeader, slots: &SlotSchedule) -> bool {
    candidate.height == tip.height
        && candidate.max_height_prevoted == tip.max_height_prevoted
        && candidate.previous_id == tip.previous_id
        && (candidate.id < tip.id || !slots.received_in_slot(tip))
}

pub fn is_different_chain(tip: TipSummary, candidate: TipSummary) -> bool {
    candidate.height > tip.height
        || (candidate.height == tip.height
            && candidate.max_height_prevoted > tip.max_height_prevoted)
}
