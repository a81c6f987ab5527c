//! In-memory collaborator implementations shared by tests across the
//! workspace.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use valence_chain_types::{Block, BlockHeight, BlockId};

use crate::errors::{ChainStoreError, ExecutionError};
use crate::executor::{BlockExecutor, ExecutionResult};
use crate::store::{ChainStore, ChainStoreResult};

/// A [`ChainStore`] over a `BTreeMap`, transactional per call like the real
/// storage engine.
#[derive(Debug, Default)]
pub struct InMemoryChainStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    blocks: BTreeMap<BlockHeight, Block>,
    backed_up: Vec<Block>,
}

impl InMemoryChainStore {
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let blocks = blocks.into_iter().map(|block| (block.height(), block)).collect();
        Self { inner: Mutex::new(StoreInner { blocks, backed_up: Vec::new() }) }
    }

    /// The stored chain, ascending by height.
    pub fn all_blocks(&self) -> Vec<Block> {
        self.inner.lock().unwrap().blocks.values().cloned().collect()
    }

    pub fn backed_up_len(&self) -> usize {
        self.inner.lock().unwrap().backed_up.len()
    }
}

#[async_trait]
impl ChainStore for InMemoryChainStore {
    async fn tip(&self) -> ChainStoreResult<Option<Block>> {
        Ok(self.inner.lock().unwrap().blocks.values().next_back().cloned())
    }

    async fn get_block_by_height(&self, height: BlockHeight) -> ChainStoreResult<Option<Block>> {
        Ok(self.inner.lock().unwrap().blocks.get(&height).cloned())
    }

    async fn get_blocks_by_height_range(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> ChainStoreResult<Vec<Block>> {
        Ok(self.inner.lock().unwrap().blocks.range(from..=to).map(|(_, block)| block.clone()).collect())
    }

    async fn block_ids_at_heights(
        &self,
        heights: Vec<BlockHeight>,
    ) -> ChainStoreResult<Vec<BlockId>> {
        let inner = self.inner.lock().unwrap();
        Ok(heights.iter().filter_map(|height| inner.blocks.get(height).map(Block::id)).collect())
    }

    async fn insert_block(&self, block: Block) -> ChainStoreResult<()> {
        self.inner.lock().unwrap().blocks.insert(block.height(), block);
        Ok(())
    }

    async fn delete_tip_block(&self, backup: bool) -> ChainStoreResult<Block> {
        let mut inner = self.inner.lock().unwrap();
        let (_, block) = inner.blocks.pop_last().ok_or(ChainStoreError::EmptyChain)?;
        if backup {
            inner.backed_up.push(block.clone());
        }
        Ok(block)
    }

    async fn pop_backed_up_blocks(&self) -> ChainStoreResult<Vec<Block>> {
        let mut inner = self.inner.lock().unwrap();
        let mut blocks = std::mem::take(&mut inner.backed_up);
        blocks.sort_by_key(Block::height);
        Ok(blocks)
    }

    async fn clear_backed_up_blocks(&self) -> ChainStoreResult<()> {
        self.inner.lock().unwrap().backed_up.clear();
        Ok(())
    }
}

/// A [`BlockExecutor`] that succeeds everywhere except on explicitly scripted
/// block ids.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    pub fail_validation_on: Option<BlockId>,
    pub fail_apply_on: Option<BlockId>,
}

#[async_trait]
impl BlockExecutor for ScriptedExecutor {
    async fn validate_detached(&self, block: &Block) -> ExecutionResult<()> {
        match self.fail_validation_on {
            Some(id) if id == block.id() => {
                Err(ExecutionError::InvalidBlock(format!("scripted validation failure for {id}")))
            }
            _ => Ok(()),
        }
    }

    async fn apply(&self, block: &Block) -> ExecutionResult<()> {
        match self.fail_apply_on {
            Some(id) if id == block.id() => {
                Err(ExecutionError::ApplyFailed(format!("scripted apply failure for {id}")))
            }
            _ => Ok(()),
        }
    }

    async fn revert(&self, _block: &Block) -> ExecutionResult<()> {
        Ok(())
    }
}
