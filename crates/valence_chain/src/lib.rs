//! The block processing pipeline sitting between the network/forger and the
//! finality engine.
//!
//! [`processor::BlockProcessor`] classifies every incoming block against the
//! current tip with the fork choice rule, runs the
//! validate / verify / execute / persist sequence in order, and keeps the
//! [`valence_bft::FinalityManager`] consistent with storage during rewinds.
//! Storage, execution and delegate lookup are host concerns reached through
//! the traits in [`store`], [`executor`] and [`roster`].

pub mod errors;
pub mod events;
pub mod executor;
pub mod processor;
pub mod roster;
pub mod store;
#[cfg(any(feature = "testing", test))]
pub mod test_utils;

pub use errors::{ChainError, ChainStoreError, ExecutionError, RosterError};
pub use events::{chain_event_channel, ChainEvent, ChainEventReceiver, ChainEventSender};
pub use executor::{BlockExecutor, SharedBlockExecutor};
pub use processor::{BlockProcessor, ProcessOutcome};
pub use roster::{DelegateRoster, SharedDelegateRoster};
pub use store::{ChainStore, SharedChainStore};
