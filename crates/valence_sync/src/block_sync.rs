use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, warn};
use valence_bft::{classify, is_different_chain, ForkStatus, TipSummary};
use valence_chain::{BlockProcessor, ProcessOutcome, SharedBlockExecutor, SharedChainStore};
use valence_chain_types::{
    Block,
    BlockHeader,
    BlockHeight,
    PeerId,
    Round,
    SharedClock,
    Slot,
    SlotSchedule,
};

use crate::config::SyncConfig;
use crate::errors::{SyncControl, SyncError};
use crate::mechanism::{penalize_peer, SynchronizationMechanism};
use crate::metrics::record_common_height;
use crate::network::SharedSyncNetworkClient;
use crate::peer_selection::select_best_peers;
use crate::probes::round_probe_heights;

#[cfg(test)]
#[path = "block_sync_test.rs"]
mod block_sync_test;

/// Full resynchronization against the network's best chain.
///
/// Applies when the local finalized point has gone stale: the node picks the
/// most credible peer tip, walks back to the highest block both chains
/// share, rewinds to it and replays the peer's chain through regular block
/// processing.
pub struct BlockSynchronizationMechanism {
    config: SyncConfig,
    processor: Arc<BlockProcessor>,
    store: SharedChainStore,
    executor: SharedBlockExecutor,
    network: SharedSyncNetworkClient,
    clock: SharedClock,
    slots: SlotSchedule,
}

impl BlockSynchronizationMechanism {
    pub fn new(
        config: SyncConfig,
        processor: Arc<BlockProcessor>,
        store: SharedChainStore,
        executor: SharedBlockExecutor,
        network: SharedSyncNetworkClient,
        clock: SharedClock,
        slots: SlotSchedule,
    ) -> Self {
        Self { config, processor, store, executor, network, clock, slots }
    }

    /// Picks the peer to sync against: the random representative of the best
    /// aggregated tip group. Fails with [`SyncControl::Abort`] when that tip
    /// does not improve on the local chain.
    async fn select_peer(&self) -> Result<PeerId, SyncError> {
        let peers = self.network.connected_peers().await?;
        let best = select_best_peers(&peers);
        let Some(representative) = best.first() else {
            return Err(SyncError::NoPeersAvailable);
        };

        let local_tip = self.processor.tip().await?;
        let claimed = TipSummary {
            height: representative.height,
            max_height_prevoted: representative.prevoted_confirmed_upto_height,
        };
        if !is_different_chain((&local_tip.header).into(), claimed) {
            return Err(SyncControl::Abort {
                reason: "the best aggregated peer tip does not improve on the local chain"
                    .to_string(),
            }
            .into());
        }

        // Non-empty by the check above.
        let chosen = best.choose(&mut rand::thread_rng()).ok_or(SyncError::NoPeersAvailable)?;
        debug!(
            peer = %chosen.peer,
            group_size = best.len(),
            claimed_height = %chosen.height,
            "Selected a peer from the best tip group."
        );
        Ok(chosen.peer)
    }

    /// Fetches the peer's actual last block and checks it backs up the
    /// group's claim: structurally valid and on a better chain than ours.
    async fn check_peer_last_block(&self, peer: PeerId) -> Result<Block, SyncError> {
        let peer_tip = match self.network.request_last_block(peer).await {
            Ok(block) => block,
            Err(err) => {
                penalize_peer(&self.network, &self.config, peer, "did not serve its last block")
                    .await;
                return Err(SyncControl::Restart {
                    reason: format!("the peer's last block was unobtainable: {err}"),
                }
                .into());
            }
        };
        if let Err(err) = self.executor.validate_detached(&peer_tip).await {
            penalize_peer(&self.network, &self.config, peer, "served an invalid last block").await;
            return Err(SyncControl::Restart {
                reason: format!("the peer's last block failed validation: {err}"),
            }
            .into());
        }

        let local_tip = self.processor.tip().await?;
        let status = classify(&peer_tip.header, &local_tip.header, &self.slots);
        if status != ForkStatus::DifferentChain {
            penalize_peer(
                &self.network,
                &self.config,
                peer,
                "advertised a tip that is not on a better chain",
            )
            .await;
            return Err(SyncControl::Restart {
                reason: format!("the peer's last block classified as {status}"),
            }
            .into());
        }
        Ok(peer_tip)
    }

    /// Probes the peer for the highest block both chains share, one batch of
    /// round-boundary ids per request, walking towards finality.
    async fn find_common_block(&self, peer: PeerId) -> Result<BlockHeader, SyncError> {
        let finalized = self.processor.finalized_height().await;
        let schedule = self.processor.bft_config().round_schedule();
        let tip = self.processor.tip().await?;
        let mut round = schedule.round_of(tip.height());

        for _ in 0..self.config.max_common_block_requests {
            if round.0 == 0 {
                break;
            }
            let heights = round_probe_heights(
                &schedule,
                round,
                self.config.common_block_ids_per_request,
                finalized,
            );
            let ids = self.store.block_ids_at_heights(heights).await?;
            match self.network.request_highest_common_block(peer, ids).await {
                Ok(Some(common)) => {
                    if common.height <= finalized {
                        penalize_peer(
                            &self.network,
                            &self.config,
                            peer,
                            "only shares history at or below the finalized height",
                        )
                        .await;
                        return Err(SyncControl::Restart {
                            reason: format!(
                                "the common block at {} does not clear the finalized height {}",
                                common.height, finalized
                            ),
                        }
                        .into());
                    }
                    info!(common_height = %common.height, "Found the highest common block.");
                    record_common_height(common.height);
                    return Ok(common);
                }
                Ok(None) => {}
                Err(err) => {
                    penalize_peer(
                        &self.network,
                        &self.config,
                        peer,
                        "did not answer a common-block probe",
                    )
                    .await;
                    return Err(SyncControl::Restart {
                        reason: format!("a common-block probe failed: {err}"),
                    }
                    .into());
                }
            }
            round = Round(round.0.saturating_sub(self.config.common_block_ids_per_request));
        }

        penalize_peer(&self.network, &self.config, peer, "shares no history within the probe span")
            .await;
        Err(SyncControl::Restart {
            reason: "no common block found within the probe budget".to_string(),
        }
        .into())
    }

    /// Applies the peer's chain from `common` to `target_height` through
    /// regular block processing. Any block the peer fails to deliver or the
    /// chain refuses to apply voids the attempt: the partially applied chain
    /// is deleted and the backed-up local branch restored.
    async fn replay_peer_chain(
        &self,
        peer: PeerId,
        common: &BlockHeader,
        target_height: BlockHeight,
    ) -> Result<(), SyncError> {
        let mut from_id = common.id;
        let mut reached = common.height;
        while reached < target_height {
            let batch = match self
                .network
                .request_blocks_from_id(peer, from_id, self.config.blocks_per_fetch)
                .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    return self
                        .fail_replay(peer, common.height, format!("a block fetch failed: {err}"))
                        .await;
                }
            };
            if batch.is_empty() {
                return self
                    .fail_replay(
                        peer,
                        common.height,
                        format!("the peer served no blocks past height {reached}"),
                    )
                    .await;
            }
            for block in batch {
                let height = block.height();
                let id = block.id();
                match self.processor.process(block, None).await {
                    Ok(ProcessOutcome::Applied) => {
                        reached = height;
                        from_id = id;
                    }
                    Ok(outcome) => {
                        return self
                            .fail_replay(
                                peer,
                                common.height,
                                format!("a replayed block at {height} came back {outcome:?}"),
                            )
                            .await;
                    }
                    Err(err) => {
                        return self
                            .fail_replay(
                                peer,
                                common.height,
                                format!("a replayed block at {height} was rejected: {err}"),
                            )
                            .await;
                    }
                }
            }
            debug!(%reached, target = %target_height, "Replayed a batch of peer blocks.");
        }
        Ok(())
    }

    /// Rolls the chain back to `common_height`, restores the backed-up local
    /// branch, penalizes `peer` and asks for a restart.
    async fn fail_replay(
        &self,
        peer: PeerId,
        common_height: BlockHeight,
        reason: String,
    ) -> Result<(), SyncError> {
        warn!(%peer, %reason, "Replaying the peer's chain failed; restoring the local branch.");
        self.processor.delete_blocks_after(common_height, false).await?;
        self.processor.restore_backed_up_blocks().await?;
        penalize_peer(&self.network, &self.config, peer, "served an unusable chain").await;
        Err(SyncControl::Restart { reason }.into())
    }
}

#[async_trait]
impl SynchronizationMechanism for BlockSynchronizationMechanism {
    fn name(&self) -> &'static str {
        "block-sync"
    }

    /// The mechanism applies once the finalized point has gone stale: more
    /// than three rounds' worth of slots elapsed since the finalized block.
    async fn is_valid_for(&self, _candidate: &Block) -> Result<bool, SyncError> {
        let finalized_slot = match self.processor.finalized_block().await? {
            Some(block) => self.slots.slot_of(block.header.timestamp),
            // Nothing finalized yet; measure staleness from genesis.
            None => Slot(0),
        };
        let current_slot = self.slots.slot_of(self.clock.now());
        let stale_after = self.processor.bft_config().stale_finality_slots();
        Ok(current_slot.saturating_slots_since(finalized_slot) > stale_after)
    }

    #[instrument(
        skip(self, candidate),
        fields(candidate_height = %candidate.height(), candidate_id = %candidate.id()),
        level = "debug"
    )]
    async fn run(&self, candidate: &Block, _peer: PeerId) -> Result<(), SyncError> {
        let peer = self.select_peer().await?;
        let peer_tip = self.check_peer_last_block(peer).await?;
        let common = self.find_common_block(peer).await?;

        self.processor.delete_blocks_after(common.height, true).await?;
        self.replay_peer_chain(peer, &common, peer_tip.height()).await?;
        self.store.clear_backed_up_blocks().await?;
        info!(tip = %peer_tip.height(), "Synchronized with the peer's chain.");
        Ok(())
    }
}
