use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use valence_chain::{
    BlockProcessor,
    ProcessOutcome,
    SharedBlockExecutor,
    SharedChainStore,
    SharedDelegateRoster,
};
use valence_chain_types::{Block, BlockHeader, BlockHeight, PeerId};

use crate::config::SyncConfig;
use crate::errors::{SyncControl, SyncError};
use crate::mechanism::{penalize_peer, SynchronizationMechanism};
use crate::metrics::record_common_height;
use crate::network::SharedSyncNetworkClient;
use crate::probes::recent_probe_heights;

#[cfg(test)]
#[path = "fast_switch_test.rs"]
mod fast_switch_test;

/// Short reorganization near the tip onto a branch forged by a scheduled
/// delegate.
///
/// Instead of replaying a whole chain segment through regular processing,
/// the mechanism fetches the peer's branch up to the trigger block, validates
/// all of it up front and only then swaps it in, so a bad branch never costs
/// more than the swap.
pub struct FastChainSwitchingMechanism {
    config: SyncConfig,
    processor: Arc<BlockProcessor>,
    store: SharedChainStore,
    executor: SharedBlockExecutor,
    network: SharedSyncNetworkClient,
    roster: SharedDelegateRoster,
}

impl FastChainSwitchingMechanism {
    pub fn new(
        config: SyncConfig,
        processor: Arc<BlockProcessor>,
        store: SharedChainStore,
        executor: SharedBlockExecutor,
        network: SharedSyncNetworkClient,
        roster: SharedDelegateRoster,
    ) -> Self {
        Self { config, processor, store, executor, network, roster }
    }

    /// Probes every height near the tip for the highest block shared with
    /// `peer`, a chunk of ids per request.
    async fn find_common_block(&self, peer: PeerId) -> Result<BlockHeader, SyncError> {
        let tip = self.processor.tip().await?;
        let span = self.processor.bft_config().fast_switch_window();
        let heights = recent_probe_heights(tip.height(), span);
        let per_request =
            usize::try_from(self.config.common_block_ids_per_request).unwrap_or(usize::MAX);
        let max_requests =
            usize::try_from(self.config.max_common_block_requests).unwrap_or(usize::MAX);

        for chunk in heights.chunks(per_request).take(max_requests) {
            let ids = self.store.block_ids_at_heights(chunk.to_vec()).await?;
            match self.network.request_highest_common_block(peer, ids).await {
                Ok(Some(common)) => {
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
        }

        penalize_peer(&self.network, &self.config, peer, "shares no history near the tip").await;
        Err(SyncControl::Restart {
            reason: "no common block found near the tip".to_string(),
        }
        .into())
    }

    /// Fetches the peer's branch from `common` up to `target_height`,
    /// exclusive of the common block itself.
    async fn fetch_peer_blocks(
        &self,
        peer: PeerId,
        common: &BlockHeader,
        target_height: BlockHeight,
    ) -> Result<Vec<Block>, SyncError> {
        let mut blocks: Vec<Block> = Vec::new();
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
                    penalize_peer(
                        &self.network,
                        &self.config,
                        peer,
                        "stopped serving the switch span",
                    )
                    .await;
                    return Err(SyncControl::Restart {
                        reason: format!("fetching the switch span failed: {err}"),
                    }
                    .into());
                }
            };
            let Some(last) = batch.last() else {
                penalize_peer(
                    &self.network,
                    &self.config,
                    peer,
                    "served no blocks for the switch span",
                )
                .await;
                return Err(SyncControl::Restart {
                    reason: format!("the peer served no blocks past height {reached}"),
                }
                .into());
            };
            reached = last.height();
            from_id = last.id();
            blocks.extend(batch.into_iter().filter(|block| block.height() <= target_height));
        }
        Ok(blocks)
    }

    /// Swaps the tip branch for `blocks`: rewinds to the common height with a
    /// backup, applies the already-validated branch, and puts the old branch
    /// back if any of it refuses to apply.
    async fn switch_chain(
        &self,
        peer: PeerId,
        common_height: BlockHeight,
        blocks: Vec<Block>,
    ) -> Result<(), SyncError> {
        self.processor.delete_blocks_after(common_height, true).await?;
        for block in blocks {
            let height = block.height();
            match self.processor.process_validated(block).await {
                Ok(ProcessOutcome::Applied) => {}
                Ok(outcome) => {
                    return self
                        .roll_back(
                            peer,
                            common_height,
                            format!("a fetched block at {height} came back {outcome:?}"),
                        )
                        .await;
                }
                Err(err) => {
                    return self
                        .roll_back(
                            peer,
                            common_height,
                            format!("a fetched block at {height} failed to apply: {err}"),
                        )
                        .await;
                }
            }
        }
        self.store.clear_backed_up_blocks().await?;
        Ok(())
    }

    /// The switch must never leave the chain shorter than it found it: drop
    /// whatever part of the new branch got applied and re-apply the backup.
    async fn roll_back(
        &self,
        peer: PeerId,
        common_height: BlockHeight,
        reason: String,
    ) -> Result<(), SyncError> {
        warn!(%peer, %reason, "Switching branches failed; restoring the previous branch.");
        self.processor.delete_blocks_after(common_height, false).await?;
        self.processor.restore_backed_up_blocks().await?;
        Err(SyncControl::PenalizeAndAbort { peer, reason }.into())
    }
}

#[async_trait]
impl SynchronizationMechanism for FastChainSwitchingMechanism {
    fn name(&self) -> &'static str {
        "fast-switch"
    }

    /// A short fork by a delegate scheduled for the candidate's round. The
    /// height gap is checked first; the roster is only consulted for
    /// candidates within the switch span.
    async fn is_valid_for(&self, candidate: &Block) -> Result<bool, SyncError> {
        let tip = self.processor.tip().await?;
        let gap = candidate.height().0.abs_diff(tip.height().0);
        if gap > self.processor.bft_config().fast_switch_window() {
            return Ok(false);
        }
        let schedule = self.processor.bft_config().round_schedule();
        let round = schedule.round_of(candidate.height());
        let forgers = self.roster.forgers_for_round(round).await?;
        Ok(forgers.contains(&candidate.header.delegate))
    }

    #[instrument(
        skip(self, candidate),
        fields(candidate_height = %candidate.height(), candidate_id = %candidate.id()),
        level = "debug"
    )]
    async fn run(&self, candidate: &Block, peer: PeerId) -> Result<(), SyncError> {
        let common = self.find_common_block(peer).await?;

        let finalized = self.processor.finalized_height().await;
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
        let tip = self.processor.tip().await?;
        let span = self.processor.bft_config().fast_switch_window();
        let tip_gap = tip.height().0.saturating_sub(common.height.0);
        let candidate_gap = candidate.height().0.saturating_sub(common.height.0);
        if tip_gap > span || candidate_gap > span {
            return Err(SyncControl::Abort {
                reason: format!(
                    "the common block at {} sits deeper than the switch span",
                    common.height
                ),
            }
            .into());
        }

        let blocks = self.fetch_peer_blocks(peer, &common, candidate.height()).await?;
        for block in &blocks {
            if let Err(err) = self.executor.validate_detached(block).await {
                return Err(SyncControl::PenalizeAndAbort {
                    peer,
                    reason: format!(
                        "a fetched block at {} failed validation: {err}",
                        block.height()
                    ),
                }
                .into());
            }
        }

        self.switch_chain(peer, common.height, blocks).await?;
        info!(target = %candidate.height(), "Switched to the peer's branch.");
        Ok(())
    }
}
