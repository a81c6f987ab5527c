use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::warn;
use valence_chain_types::{Block, PeerId};

use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::metrics::SYNC_PEER_PENALTIES_TOTAL;
use crate::network::SharedSyncNetworkClient;

/// A strategy for catching the local chain up with a peer's.
///
/// Mechanisms are stateless between runs; reentrancy is guarded by the
/// [`crate::synchronizer::Synchronizer`], not here.
#[cfg_attr(any(feature = "testing", test), mockall::automock)]
#[async_trait]
pub trait SynchronizationMechanism: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this mechanism is the right tool for `candidate`.
    async fn is_valid_for(&self, candidate: &Block) -> Result<bool, SyncError>;

    /// Runs the strategy with `candidate` as the trigger and `peer` as the
    /// peer that sent it.
    async fn run(&self, candidate: &Block, peer: PeerId) -> Result<(), SyncError>;
}

pub type SharedSynchronizationMechanism = Arc<dyn SynchronizationMechanism>;

/// Best-effort peer penalty; a failed penalty request is logged, never fatal.
pub(crate) async fn penalize_peer(
    network: &SharedSyncNetworkClient,
    config: &SyncConfig,
    peer: PeerId,
    reason: &str,
) {
    warn!(%peer, reason, "Penalizing peer.");
    counter!(SYNC_PEER_PENALTIES_TOTAL).increment(1);
    if let Err(err) = network.apply_penalty(peer, config.penalty_score).await {
        warn!(%peer, %err, "Failed to apply the peer penalty.");
    }
}
