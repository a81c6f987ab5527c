use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "block_test.rs"]
mod block_test;

/// The position of a block in the chain. The first block sits at height 1;
/// height 0 is the "never" sentinel (e.g. a delegate that has not forged yet).
#[derive(
    derive_more::Display,
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    pub fn unchecked_next(&self) -> BlockHeight {
        BlockHeight(self.0 + 1)
    }

    pub fn prev(&self) -> Option<BlockHeight> {
        match self.0 {
            0 => None,
            _ => Some(BlockHeight(self.0 - 1)),
        }
    }

    pub fn saturating_sub(&self, offset: u64) -> BlockHeight {
        BlockHeight(self.0.saturating_sub(offset))
    }

    /// Heights `[self, up_to)` in ascending order.
    pub fn iter_up_to(&self, up_to: Self) -> impl Iterator<Item = Self> {
        let range = self.0..up_to.0;
        range.map(Self)
    }
}

/// Seconds since the chain epoch.
#[derive(
    derive_more::Display,
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn saturating_add(&self, secs: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(secs))
    }
}

/// A 32-byte block identifier. The derived `Ord` is the lexicographic byte
/// order relied on by the fork-choice tiebreak and by peer-group selection.
#[derive(Clone, Copy, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub [u8; 32]);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({self})")
    }
}

/// A delegate's public key, the forger identity carried in block headers.
#[derive(Clone, Copy, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DelegatePublicKey(pub [u8; 32]);

impl fmt::Display for DelegatePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for DelegatePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DelegatePublicKey({self})")
    }
}

/// A block header as seen by the finality engine. Immutable once added to the
/// header window.
///
/// `max_height_previously_forged` and `max_height_prevoted` are the forger's
/// own claims, stamped when it forged the block; `delegate_min_height_active`
/// is the first height of the delegate's activation round. `received_at` is
/// `None` for locally forged blocks and stamped by the network layer on
/// receipt otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: BlockId,
    pub height: BlockHeight,
    pub previous_id: BlockId,
    pub timestamp: Timestamp,
    pub delegate: DelegatePublicKey,
    pub max_height_previously_forged: BlockHeight,
    pub max_height_prevoted: BlockHeight,
    pub delegate_min_height_active: BlockHeight,
    pub received_at: Option<Timestamp>,
}

/// A full block. The payload (transactions) is opaque to consensus and
/// synchronization; its semantics live behind the execution collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

impl Block {
    pub fn id(&self) -> BlockId {
        self.header.id
    }

    pub fn height(&self) -> BlockHeight {
        self.header.height
    }
}
