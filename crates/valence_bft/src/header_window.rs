use std::collections::VecDeque;

use valence_chain_types::{BlockHeader, BlockHeight};

use crate::errors::BftError;

#[cfg(test)]
#[path = "header_window_test.rs"]
mod header_window_test;

/// A bounded buffer holding a contiguous suffix of the chain's headers,
/// ordered by height. Pushing beyond capacity evicts the oldest header.
#[derive(Clone, Debug)]
pub struct HeaderWindow {
    headers: VecDeque<BlockHeader>,
    capacity: usize,
}

impl HeaderWindow {
    pub fn new(capacity: usize) -> Self {
        Self { headers: VecDeque::with_capacity(capacity), capacity }
    }

    /// Appends `header`; its height must extend the window by exactly one.
    /// Returns the evicted header, if the capacity was exceeded.
    pub fn push(&mut self, header: BlockHeader) -> Result<Option<BlockHeader>, BftError> {
        if let Some(latest) = self.headers.back() {
            let expected = latest.height.unchecked_next();
            if header.height != expected {
                return Err(BftError::InvalidHeader {
                    reason: format!(
                        "non-contiguous height: expected {expected}, got {}",
                        header.height
                    ),
                });
            }
        }
        self.headers.push_back(header);
        if self.headers.len() > self.capacity {
            return Ok(self.headers.pop_front());
        }
        Ok(None)
    }

    /// Drops every header above `height`.
    pub fn remove_after(&mut self, height: BlockHeight) {
        while self.headers.back().is_some_and(|h| h.height > height) {
            self.headers.pop_back();
        }
    }

    pub fn latest(&self) -> Option<&BlockHeader> {
        self.headers.back()
    }

    pub fn oldest(&self) -> Option<&BlockHeader> {
        self.headers.front()
    }

    pub fn get(&self, height: BlockHeight) -> Option<&BlockHeader> {
        let first = self.oldest()?.height;
        if height < first {
            return None;
        }
        let offset = usize::try_from(height.0 - first.0).ok()?;
        self.headers.get(offset)
    }

    /// Headers in ascending height order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockHeader> {
        self.headers.iter()
    }

    /// Headers in descending height order, the direction header verification
    /// scans in.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &BlockHeader> {
        self.headers.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
