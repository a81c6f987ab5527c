//! Core value types shared by the Valence consensus and synchronization
//! crates: block identity and headers, round/slot arithmetic, and the wall
//! clock seam.
//!
//! Everything here is pure data; nothing performs I/O.

pub mod block;
pub mod peer;
pub mod rounds;
pub mod slots;
#[cfg(any(feature = "testing", test))]
pub mod test_utils;

pub use block::{Block, BlockHeader, BlockHeight, BlockId, DelegatePublicKey, Timestamp};
pub use peer::PeerId;
pub use rounds::{Round, RoundSchedule};
pub use slots::{Clock, SharedClock, Slot, SlotSchedule, SystemClock};
