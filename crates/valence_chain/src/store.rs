use std::sync::Arc;

use async_trait::async_trait;
use valence_chain_types::{Block, BlockHeight, BlockId};

use crate::errors::ChainStoreError;

pub type ChainStoreResult<T> = Result<T, ChainStoreError>;

/// The persisted chain, owned by the host's storage engine.
///
/// Every operation is transactional at single-block granularity; multi-block
/// rewinds are driven block by block from [`crate::processor::BlockProcessor`].
#[cfg_attr(any(feature = "testing", test), mockall::automock)]
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// The highest stored block, or `None` for an empty chain.
    async fn tip(&self) -> ChainStoreResult<Option<Block>>;

    async fn get_block_by_height(&self, height: BlockHeight)
        -> ChainStoreResult<Option<Block>>;

    /// All stored blocks with `from <= height <= to`, ascending.
    async fn get_blocks_by_height_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> ChainStoreResult<Vec<Block>>;

    /// Ids of the stored blocks at exactly `heights`, keeping the input
    /// order. Heights with no stored block are skipped.
    async fn block_ids_at_heights(
        &self,
        heights: Vec<BlockHeight>,
    ) -> ChainStoreResult<Vec<BlockId>>;

    /// Appends `block` as the new tip.
    async fn insert_block(&self, block: Block) -> ChainStoreResult<()>;

    /// Deletes and returns the tip block. With `backup` set, the block is
    /// also written to a side table read back by [`Self::pop_backed_up_blocks`].
    async fn delete_tip_block(&self, backup: bool) -> ChainStoreResult<Block>;

    /// Drains the backup side table, oldest block first.
    async fn pop_backed_up_blocks(&self) -> ChainStoreResult<Vec<Block>>;

    /// Discards the backup side table.
    async fn clear_backed_up_blocks(&self) -> ChainStoreResult<()>;
}

pub type SharedChainStore = Arc<dyn ChainStore>;
