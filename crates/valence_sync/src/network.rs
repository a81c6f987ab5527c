use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use valence_chain_types::{Block, BlockHeader, BlockHeight, BlockId, PeerId};

/// A peer's self-reported view of its chain, refreshed by the network layer
/// on every status exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer: PeerId,
    pub height: BlockHeight,
    pub prevoted_confirmed_upto_height: BlockHeight,
    pub last_block_id: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("request to {peer} failed: {reason}")]
    RequestFailed { peer: PeerId, reason: String },
    #[error("{peer} sent an unusable response: {reason}")]
    BadResponse { peer: PeerId, reason: String },
}

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Typed peer requests used by the synchronization mechanisms.
#[cfg_attr(any(feature = "testing", test), mockall::automock)]
#[async_trait]
pub trait SyncNetworkClient: Send + Sync {
    async fn connected_peers(&self) -> NetworkResult<Vec<PeerInfo>>;

    async fn request_last_block(&self, peer: PeerId) -> NetworkResult<Block>;

    /// The highest block among `ids` that the peer also has, if any.
    async fn request_highest_common_block(
        &self,
        peer: PeerId,
        ids: Vec<BlockId>,
    ) -> NetworkResult<Option<BlockHeader>>;

    /// Up to `limit` blocks directly after the block `from` on the peer's
    /// chain, ascending.
    async fn request_blocks_from_id(
        &self,
        peer: PeerId,
        from: BlockId,
        limit: u64,
    ) -> NetworkResult<Vec<Block>>;

    async fn apply_penalty(&self, peer: PeerId, score: u64) -> NetworkResult<()>;
}

pub type SharedSyncNetworkClient = Arc<dyn SyncNetworkClient>;
