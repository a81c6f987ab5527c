use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use valence_bft::{classify, BftConfig, BftError, FinalityManager, ForkStatus};
use valence_chain_types::{Block, BlockHeight, PeerId, SlotSchedule};

use crate::errors::ChainError;
use crate::events::{ChainEvent, ChainEventSender};
use crate::executor::SharedBlockExecutor;
use crate::store::SharedChainStore;

#[cfg(test)]
#[path = "processor_test.rs"]
mod processor_test;

/// What the processor did with a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Executed and persisted as the new tip.
    Applied,
    /// Won the tiebreak against the previous tip and replaced it.
    TipReplaced,
    /// Already the current tip; nothing to do.
    AlreadyKnown,
    /// Ignored per the fork choice rule.
    Discarded,
    /// Evidence of a better chain; handed over to the synchronizer via
    /// [`ChainEvent::SyncRequired`].
    SyncTriggered,
}

struct ProcessorInner {
    finality: FinalityManager,
}

/// Sequences every chain mutation: fork choice classification, detached
/// validation, contextual header verification, execution, persistence and
/// vote accounting, in that order.
///
/// All mutating entry points serialize on one internal lock, so at most one
/// block (or rewind) is in flight at a time.
pub struct BlockProcessor {
    inner: Mutex<ProcessorInner>,
    store: SharedChainStore,
    executor: SharedBlockExecutor,
    slots: SlotSchedule,
    config: BftConfig,
    events: ChainEventSender,
}

impl BlockProcessor {
    pub fn new(
        finality: FinalityManager,
        store: SharedChainStore,
        executor: SharedBlockExecutor,
        slots: SlotSchedule,
        events: ChainEventSender,
    ) -> Self {
        let config = finality.config().clone();
        Self {
            inner: Mutex::new(ProcessorInner { finality }),
            store,
            executor,
            slots,
            config,
            events,
        }
    }

    /// Handles a block received from the network (`from_peer` set) or from the
    /// local forger (`from_peer` is `None`).
    #[instrument(
        skip(self, block),
        fields(height = %block.height(), block_id = %block.id()),
        level = "debug"
    )]
    pub async fn process(
        &self,
        block: Block,
        from_peer: Option<PeerId>,
    ) -> Result<ProcessOutcome, ChainError> {
        let mut inner = self.inner.lock().await;
        self.process_locked(&mut inner, block, from_peer, true).await
    }

    /// Like [`Self::process`], for blocks whose detached validation already
    /// ran (synchronization applies batches validated up front).
    pub async fn process_validated(&self, block: Block) -> Result<ProcessOutcome, ChainError> {
        let mut inner = self.inner.lock().await;
        self.process_locked(&mut inner, block, None, false).await
    }

    async fn process_locked(
        &self,
        inner: &mut ProcessorInner,
        block: Block,
        from_peer: Option<PeerId>,
        validate: bool,
    ) -> Result<ProcessOutcome, ChainError> {
        let tip = self.stored_tip().await?;
        let status = classify(&block.header, &tip.header, &self.slots);
        debug!(
            %status,
            tip_height = %tip.height(),
            tip_id = %tip.id(),
            "Classified incoming block against the current tip."
        );
        match status {
            ForkStatus::Identical => Ok(ProcessOutcome::AlreadyKnown),
            ForkStatus::Discard => Ok(ProcessOutcome::Discarded),
            ForkStatus::DoubleForging => {
                warn!(
                    delegate = %block.header.delegate,
                    "Discarding a second block forged for the same slot."
                );
                Ok(ProcessOutcome::Discarded)
            }
            ForkStatus::ValidBlock => {
                if validate {
                    self.executor.validate_detached(&block).await?;
                }
                self.apply_block(inner, &block).await?;
                self.emit(ChainEvent::Broadcast { block: block.clone() });
                self.emit(ChainEvent::NewBlock { block });
                Ok(ProcessOutcome::Applied)
            }
            ForkStatus::TieBreak => {
                if validate {
                    self.executor.validate_detached(&block).await?;
                }
                self.replace_tip(inner, block, tip).await
            }
            ForkStatus::DifferentChain => match from_peer {
                Some(peer) => {
                    info!(%peer, "Block attests to a different chain; requesting synchronization.");
                    self.emit(ChainEvent::SyncRequired { block, peer });
                    Ok(ProcessOutcome::SyncTriggered)
                }
                None => {
                    warn!("Block attests to a different chain but no peer is attached; ignoring.");
                    Ok(ProcessOutcome::Discarded)
                }
            },
        }
    }

    /// Reverts and deletes every block above `height`, newest first. Refused
    /// below the finalized height. Returns the deleted blocks in deletion
    /// order. With `backup` set they can be re-applied through
    /// [`Self::restore_backed_up_blocks`].
    pub async fn delete_blocks_after(
        &self,
        height: BlockHeight,
        backup: bool,
    ) -> Result<Vec<Block>, ChainError> {
        let mut inner = self.inner.lock().await;
        // The finality guard runs before storage is touched, so a rewind into
        // finalized territory leaves the chain untouched.
        inner.finality.remove_headers_after(height)?;
        let mut deleted = Vec::new();
        loop {
            let tip = self.stored_tip().await?;
            if tip.height() <= height {
                break;
            }
            deleted.push(self.delete_tip(&tip, backup).await?);
        }
        info!(
            down_to = %height,
            count = deleted.len(),
            "Deleted blocks above height."
        );
        Ok(deleted)
    }

    /// Re-applies the blocks saved by a backed-up rewind, oldest first.
    /// Returns how many were restored.
    pub async fn restore_backed_up_blocks(&self) -> Result<u64, ChainError> {
        let mut inner = self.inner.lock().await;
        self.restore_backed_up(&mut inner).await
    }

    /// The current tip block. Errors on an empty chain; hosts seed storage
    /// with a genesis block before wiring the processor.
    pub async fn tip(&self) -> Result<Block, ChainError> {
        self.stored_tip().await
    }

    pub async fn finalized_height(&self) -> BlockHeight {
        self.inner.lock().await.finality.finalized_height()
    }

    pub async fn prevoted_confirmed_height(&self) -> BlockHeight {
        self.inner.lock().await.finality.prevoted_confirmed_height()
    }

    /// The stored block at the finalized height, if any is persisted yet.
    pub async fn finalized_block(&self) -> Result<Option<Block>, ChainError> {
        let height = self.finalized_height().await;
        Ok(self.store.get_block_by_height(height).await?)
    }

    pub fn bft_config(&self) -> &BftConfig {
        &self.config
    }

    /// Runs verify / execute / persist / account for one block that extends
    /// the current tip.
    async fn apply_block(&self, inner: &mut ProcessorInner, block: &Block) -> Result<(), ChainError> {
        // Verify up front: a header the finality engine would reject must not
        // reach execution or storage.
        inner.finality.verify_header(&block.header)?;
        self.executor.apply(block).await?;
        self.store.insert_block(block.clone()).await?;
        inner.finality.add_header(block.header.clone())?;
        Ok(())
    }

    async fn replace_tip(
        &self,
        inner: &mut ProcessorInner,
        candidate: Block,
        tip: Block,
    ) -> Result<ProcessOutcome, ChainError> {
        info!(
            tip_id = %tip.id(),
            "Tiebreak won by the received block; replacing the current tip."
        );
        let rewind_to = tip.height().saturating_sub(1);
        match inner.finality.remove_headers_after(rewind_to) {
            Ok(()) => {}
            // A tip sitting directly above the finalized height cannot be
            // displaced; keep it and drop the candidate.
            Err(BftError::BelowFinalizedHeight { .. }) => {
                warn!("Tiebreak winner would rewind into finalized territory; keeping the tip.");
                return Ok(ProcessOutcome::Discarded);
            }
            Err(err) => return Err(err.into()),
        }
        self.delete_tip(&tip, true).await?;
        match self.apply_block(inner, &candidate).await {
            Ok(()) => {
                self.store.clear_backed_up_blocks().await?;
                self.emit(ChainEvent::Broadcast { block: candidate.clone() });
                self.emit(ChainEvent::NewBlock { block: candidate });
                Ok(ProcessOutcome::TipReplaced)
            }
            Err(err) => {
                warn!(%err, "Tiebreak winner failed to apply; restoring the previous tip.");
                self.restore_backed_up(inner).await?;
                Err(err)
            }
        }
    }

    /// Reverts and deletes the current tip. The finality window must already
    /// be truncated past it.
    async fn delete_tip(&self, tip: &Block, backup: bool) -> Result<Block, ChainError> {
        self.executor.revert(tip).await?;
        let deleted = self.store.delete_tip_block(backup).await?;
        self.emit(ChainEvent::BlockDeleted { block: deleted.clone() });
        Ok(deleted)
    }

    async fn restore_backed_up(&self, inner: &mut ProcessorInner) -> Result<u64, ChainError> {
        let blocks = self.store.pop_backed_up_blocks().await?;
        let count = u64::try_from(blocks.len()).unwrap_or(u64::MAX);
        for block in blocks {
            self.apply_block(inner, &block).await?;
            self.emit(ChainEvent::NewBlock { block });
        }
        debug!(count, "Restored backed up blocks.");
        Ok(count)
    }

    async fn stored_tip(&self) -> Result<Block, ChainError> {
        self.store.tip().await?.ok_or(ChainError::EmptyChain)
    }

    fn emit(&self, event: ChainEvent) {
        // Send only fails when the receiver is gone, i.e. at shutdown.
        if let Err(err) = self.events.send(event) {
            debug!(%err, "Dropping chain event; the receiver is closed.");
        }
    }
}
