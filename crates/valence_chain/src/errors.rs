use thiserror::Error;
use valence_bft::BftError;
use valence_chain_types::BlockHeight;

/// Errors surfaced by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainStoreError {
    #[error("no block stored at height {0}")]
    BlockNotFound(BlockHeight),
    #[error("cannot delete from an empty chain")]
    EmptyChain,
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Errors surfaced by the execution collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("block validation failed: {0}")]
    InvalidBlock(String),
    #[error("block application failed: {0}")]
    ApplyFailed(String),
    #[error("block revert failed: {0}")]
    RevertFailed(String),
}

/// Errors surfaced by the delegate roster collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delegate roster failure: {0}")]
pub struct RosterError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error(transparent)]
    Bft(#[from] BftError),
    #[error(transparent)]
    Store(#[from] ChainStoreError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("the chain has no blocks")]
    EmptyChain,
}
