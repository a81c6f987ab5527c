use thiserror::Error;
use valence_chain::{ChainError, ChainStoreError, RosterError};
use valence_chain_types::PeerId;

use crate::network::NetworkError;

/// Direction a failed mechanism step gives the synchronizer. Matched
/// explicitly in [`crate::synchronizer::Synchronizer::run`]; never used for
/// flow control inside a mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncControl {
    /// Abandon this attempt and re-enter mechanism selection with the
    /// original candidate block. The mechanism has already penalized the
    /// culprit.
    #[error("synchronization restart requested: {reason}")]
    Restart { reason: String },
    /// Penalize `peer` and stop this run; no retry.
    #[error("penalize {peer} and abort synchronization: {reason}")]
    PenalizeAndAbort { peer: PeerId, reason: String },
    /// Stop this run without blaming anyone.
    #[error("synchronization aborted: {reason}")]
    Abort { reason: String },
}

#[derive(Debug, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("a synchronization run is already active")]
    AlreadyRunning,
    #[error("no connected peers to synchronize against")]
    NoPeersAvailable,
    #[error(transparent)]
    Control(#[from] SyncControl),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] ChainStoreError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Roster(#[from] RosterError),
}
