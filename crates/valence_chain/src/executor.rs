use std::sync::Arc;

use async_trait::async_trait;
use valence_chain_types::Block;

use crate::errors::ExecutionError;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Validates and executes blocks. State transition semantics live entirely
/// behind this boundary; the processor only sequences the calls.
#[cfg_attr(any(feature = "testing", test), mockall::automock)]
#[async_trait]
pub trait BlockExecutor: Send + Sync {
    /// Checks that hold independently of the current chain state: signatures,
    /// payload shape, static limits.
    async fn validate_detached(&self, block: &Block) -> ExecutionResult<()>;

    /// Applies the state transition of `block` on top of the current state.
    async fn apply(&self, block: &Block) -> ExecutionResult<()>;

    /// Undoes the state transition of `block`. `block` must be the most
    /// recently applied one.
    async fn revert(&self, block: &Block) -> ExecutionResult<()>;
}

pub type SharedBlockExecutor = Arc<dyn BlockExecutor>;
