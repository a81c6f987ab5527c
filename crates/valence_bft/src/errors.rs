use thiserror::Error;
use valence_chain_types::{BlockHeight, DelegatePublicKey};

/// Consensus violations raised by the finality engine. Each is fatal to the
/// offending header only; the caller decides whether to penalize a peer or
/// drop a locally forged header.
#[derive(Debug, Clone, PartialEq, Eq, Error, strum_macros::IntoStaticStr)]
pub enum BftError {
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },
    #[error(
        "header claims max_height_prevoted {claimed} but the chain's prevoted confirmed height \
         is {expected}"
    )]
    WrongPrevotedHeight { claimed: BlockHeight, expected: BlockHeight },
    #[error(
        "delegate {delegate} forged at height {height} without advancing past its previous \
         header at height {last_height}"
    )]
    ForkChoiceViolation {
        delegate: DelegatePublicKey,
        last_height: BlockHeight,
        height: BlockHeight,
    },
    #[error(
        "delegate {delegate} previously extended the chain to height {last_height} but now \
         claims max previously forged height {claimed}"
    )]
    DisjointnessViolation {
        delegate: DelegatePublicKey,
        last_height: BlockHeight,
        claimed: BlockHeight,
    },
    #[error("delegate {delegate} regressed max_height_prevoted from {last_prevoted} to {claimed}")]
    PrevoteMonotonicityViolation {
        delegate: DelegatePublicKey,
        last_prevoted: BlockHeight,
        claimed: BlockHeight,
    },
    #[error("cannot rewind to height {requested}: finalized height is {finalized}")]
    BelowFinalizedHeight { requested: BlockHeight, finalized: BlockHeight },
}
