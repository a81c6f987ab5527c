//! Byzantine-fault-tolerant finality for a delegated-proof-of-stake chain.
//!
//! The engine tracks a bounded sliding window of block headers and derives
//! two consensus heights from the implicit votes those headers carry:
//!
//! * `prevoted_confirmed_height` - the highest height whose pre-vote tally
//!   cleared the 2/3 threshold of the active delegate set.
//! * `finalized_height` - the highest height whose pre-commit tally cleared
//!   the same threshold; blocks at or below it are irreversible.
//!
//! [`finality_manager::FinalityManager`] owns that state and validates every
//! incoming header against the consensus safety rules before it is counted.
//! [`fork_choice`] is the pure companion rule deciding how a candidate block
//! relates to the current tip.

pub mod config;
pub mod errors;
pub mod finality_manager;
pub mod fork_choice;
pub mod header_window;
pub mod metrics;
pub mod vote_threshold;

pub use config::BftConfig;
pub use errors::BftError;
pub use finality_manager::FinalityManager;
pub use fork_choice::{classify, is_different_chain, ForkStatus, TipSummary};
pub use header_window::HeaderWindow;
pub use vote_threshold::{VoteThreshold, FINALITY_THRESHOLD};
