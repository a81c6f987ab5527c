use tokio::sync::mpsc;
use valence_chain_types::{Block, PeerId};

/// Notifications emitted by the block processor. The host's network layer
/// consumes these to gossip blocks and to start synchronization runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// A block was executed and persisted as the new tip.
    NewBlock { block: Block },
    /// A block was reverted and deleted during a rewind.
    BlockDeleted { block: Block },
    /// The block should be gossiped to peers.
    Broadcast { block: Block },
    /// A received block proves the local chain is behind or on a different
    /// branch; the synchronizer should take over against `peer`.
    SyncRequired { block: Block, peer: PeerId },
}

pub type ChainEventSender = mpsc::UnboundedSender<ChainEvent>;
pub type ChainEventReceiver = mpsc::UnboundedReceiver<ChainEvent>;

pub fn chain_event_channel() -> (ChainEventSender, ChainEventReceiver) {
    mpsc::unbounded_channel()
}
