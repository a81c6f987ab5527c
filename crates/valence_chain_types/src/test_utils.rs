//! Builders for headers and blocks used across the workspace's tests.

use crate::block::{Block, BlockHeader, BlockHeight, BlockId, DelegatePublicKey, Timestamp};

/// A block id whose byte order matches the numeric order of `n`.
pub fn test_block_id(n: u64) -> BlockId {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    BlockId(bytes)
}

pub fn test_delegate(n: u8) -> DelegatePublicKey {
    DelegatePublicKey([n; 32])
}

/// Builds headers with sane defaults: id/previous id derived from the height,
/// a 10-second slot cadence, delegate 0, no prior forging claims, active from
/// height 1, locally forged (no receipt stamp).
#[derive(Clone, Debug)]
pub struct HeaderBuilder {
    header: BlockHeader,
}

impl HeaderBuilder {
    pub fn at_height(height: u64) -> Self {
        Self {
            header: BlockHeader {
                id: test_block_id(height),
                height: BlockHeight(height),
                previous_id: test_block_id(height.saturating_sub(1)),
                timestamp: Timestamp(height.saturating_mul(10)),
                delegate: test_delegate(0),
                max_height_previously_forged: BlockHeight(0),
                max_height_prevoted: BlockHeight(0),
                delegate_min_height_active: BlockHeight(1),
                received_at: None,
            },
        }
    }

    pub fn id(mut self, n: u64) -> Self {
        self.header.id = test_block_id(n);
        self
    }

    pub fn raw_id(mut self, id: BlockId) -> Self {
        self.header.id = id;
        self
    }

    pub fn previous_id(mut self, n: u64) -> Self {
        self.header.previous_id = test_block_id(n);
        self
    }

    pub fn timestamp(mut self, secs: u64) -> Self {
        self.header.timestamp = Timestamp(secs);
        self
    }

    pub fn delegate(mut self, n: u8) -> Self {
        self.header.delegate = test_delegate(n);
        self
    }

    pub fn previously_forged(mut self, height: u64) -> Self {
        self.header.max_height_previously_forged = BlockHeight(height);
        self
    }

    pub fn prevoted(mut self, height: u64) -> Self {
        self.header.max_height_prevoted = BlockHeight(height);
        self
    }

    pub fn min_active(mut self, height: u64) -> Self {
        self.header.delegate_min_height_active = BlockHeight(height);
        self
    }

    pub fn received_at(mut self, secs: u64) -> Self {
        self.header.received_at = Some(Timestamp(secs));
        self
    }

    pub fn build(self) -> BlockHeader {
        self.header
    }

    pub fn build_block(self) -> Block {
        Block { header: self.header, payload: vec![] }
    }
}
