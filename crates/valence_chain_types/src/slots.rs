use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::block::{BlockHeader, Timestamp};

#[cfg(test)]
#[path = "slots_test.rs"]
mod slots_test;

/// A forging slot index; each slot admits one block from one delegate.
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
pub struct Slot(pub u64);

impl Slot {
    pub fn unchecked_next(&self) -> Slot {
        Slot(self.0 + 1)
    }

    /// Number of slots elapsed since `earlier`, clamped at zero.
    pub fn saturating_slots_since(&self, earlier: Slot) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Maps wall-clock timestamps to forging slots.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SlotSchedule {
    pub genesis_timestamp: Timestamp,
    /// Seconds per forging slot. Must be positive.
    pub slot_duration_secs: u64,
}

impl SlotSchedule {
    pub fn new(genesis_timestamp: Timestamp, slot_duration_secs: u64) -> Self {
        Self { genesis_timestamp, slot_duration_secs }
    }

    /// The slot containing `timestamp`; times before genesis clamp to slot 0.
    pub fn slot_of(&self, timestamp: Timestamp) -> Slot {
        Slot(timestamp.0.saturating_sub(self.genesis_timestamp.0) / self.slot_duration_secs)
    }

    /// The first timestamp of `slot`.
    pub fn slot_start(&self, slot: Slot) -> Timestamp {
        Timestamp(self.genesis_timestamp.0.saturating_add(slot.0.saturating_mul(self.slot_duration_secs)))
    }

    /// Whether `header` was received before its forging slot ended. Locally
    /// forged headers carry no receipt stamp and count as in-slot.
    pub fn received_in_slot(&self, header: &BlockHeader) -> bool {
        match header.received_at {
            None => true,
            Some(received_at) => {
                let slot_end = self.slot_start(self.slot_of(header.timestamp).unchecked_next());
                received_at < slot_end
            }
        }
    }
}

/// Wall-clock source, injectable so time-dependent decisions are testable.
#[cfg_attr(any(feature = "testing", test), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

pub type SharedClock = Arc<dyn Clock>;

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Timestamp(since_epoch.as_secs())
    }
}
