use std::sync::Arc;

use async_trait::async_trait;
use valence_chain_types::{DelegatePublicKey, Round};

use crate::errors::RosterError;

/// Supplies the delegates scheduled to forge in a round. Vote weighting and
/// forger selection are the host's concern.
#[cfg_attr(any(feature = "testing", test), mockall::automock)]
#[async_trait]
pub trait DelegateRoster: Send + Sync {
    async fn forgers_for_round(&self, round: Round)
        -> Result<Vec<DelegatePublicKey>, RosterError>;
}

pub type SharedDelegateRoster = Arc<dyn DelegateRoster>;
