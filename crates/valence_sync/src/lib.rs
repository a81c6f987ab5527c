//! Chain synchronization against peers.
//!
//! The [`synchronizer::Synchronizer`] owns a priority-ordered list of
//! [`mechanism::SynchronizationMechanism`]s and runs the first one that
//! declares itself applicable to a received block, guaranteeing a single
//! active run at a time. Two mechanisms are provided:
//! [`fast_switch::FastChainSwitchingMechanism`] for short reorganizations
//! near the tip and [`block_sync::BlockSynchronizationMechanism`] for
//! catching up a chain whose finalized point has gone stale.
//!
//! Mechanism failures are typed: a [`errors::SyncControl`] tells the
//! synchronizer whether to restart selection, penalize a peer and stop, or
//! just stop.

pub mod block_sync;
pub mod config;
pub mod errors;
pub mod fast_switch;
pub mod mechanism;
pub mod metrics;
pub mod network;
pub mod peer_selection;
pub mod probes;
pub mod synchronizer;

pub use block_sync::BlockSynchronizationMechanism;
pub use config::SyncConfig;
pub use errors::{SyncControl, SyncError};
pub use fast_switch::FastChainSwitchingMechanism;
pub use mechanism::{SharedSynchronizationMechanism, SynchronizationMechanism};
pub use network::{NetworkError, PeerInfo, SharedSyncNetworkClient, SyncNetworkClient};
pub use synchronizer::Synchronizer;
