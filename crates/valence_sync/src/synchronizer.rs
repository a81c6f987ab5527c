use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;
use tracing::{debug, info, instrument};
use valence_chain::{ChainError, SharedBlockExecutor};
use valence_chain_types::{Block, PeerId};

use crate::config::SyncConfig;
use crate::errors::{SyncControl, SyncError};
use crate::mechanism::{penalize_peer, SharedSynchronizationMechanism};
use crate::metrics::{SYNC_RESTARTS_TOTAL, SYNC_RUNS_TOTAL};
use crate::network::SharedSyncNetworkClient;

#[cfg(test)]
#[path = "synchronizer_test.rs"]
mod synchronizer_test;

/// Entry point of the synchronization subsystem.
///
/// Holds the mechanisms in priority order and, per received block, runs the
/// first one that declares itself applicable. At most one run is active at a
/// time; concurrent callers get [`SyncError::AlreadyRunning`] and are expected
/// to drop the block.
pub struct Synchronizer {
    mechanisms: Vec<SharedSynchronizationMechanism>,
    executor: SharedBlockExecutor,
    network: SharedSyncNetworkClient,
    config: SyncConfig,
    active: AtomicBool,
}

/// Releases the single-run slot when a run ends, on every exit path.
struct ActiveGuard<'a> {
    active: &'a AtomicBool,
}

impl<'a> ActiveGuard<'a> {
    fn acquire(active: &'a AtomicBool) -> Option<Self> {
        active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(Self { active })
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Synchronizer {
    pub fn new(
        mechanisms: Vec<SharedSynchronizationMechanism>,
        executor: SharedBlockExecutor,
        network: SharedSyncNetworkClient,
        config: SyncConfig,
    ) -> Self {
        Self { mechanisms, executor, network, config, active: AtomicBool::new(false) }
    }

    /// Synchronizes the local chain toward `candidate`, a block received from
    /// `peer` that did not fit the current chain.
    ///
    /// The candidate is statically validated before any mechanism runs. A
    /// mechanism asking for a restart re-enters mechanism selection with the
    /// same candidate until the restart budget runs out; a penalize-and-abort
    /// verdict applies the penalty here and stops the run.
    #[instrument(
        skip(self, candidate),
        fields(candidate_height = %candidate.height(), %peer),
        level = "debug"
    )]
    pub async fn run(&self, candidate: &Block, peer: PeerId) -> Result<(), SyncError> {
        let Some(_guard) = ActiveGuard::acquire(&self.active) else {
            return Err(SyncError::AlreadyRunning);
        };
        counter!(SYNC_RUNS_TOTAL).increment(1);
        self.executor.validate_detached(candidate).await.map_err(ChainError::from)?;

        let mut restarts = 0;
        loop {
            let Some(mechanism) = self.select_mechanism(candidate).await? else {
                debug!("No synchronization mechanism applies to the block; nothing to do.");
                return Ok(());
            };
            info!(mechanism = mechanism.name(), "Starting a synchronization attempt.");
            match mechanism.run(candidate, peer).await {
                Ok(()) => {
                    info!(mechanism = mechanism.name(), "Synchronization finished.");
                    return Ok(());
                }
                Err(SyncError::Control(SyncControl::Restart { reason })) => {
                    counter!(SYNC_RESTARTS_TOTAL).increment(1);
                    restarts += 1;
                    if restarts > self.config.max_restarts {
                        return Err(SyncControl::Abort {
                            reason: format!("restart budget exhausted after: {reason}"),
                        }
                        .into());
                    }
                    debug!(%reason, restarts, "Synchronization restart requested.");
                }
                Err(SyncError::Control(SyncControl::PenalizeAndAbort { peer: culprit, reason })) => {
                    penalize_peer(&self.network, &self.config, culprit, &reason).await;
                    return Err(SyncControl::Abort { reason }.into());
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// The first mechanism, in priority order, that applies to `candidate`.
    /// Re-evaluated after every restart: a restarted run may have moved the
    /// chain enough to change the answer.
    async fn select_mechanism(
        &self,
        candidate: &Block,
    ) -> Result<Option<&SharedSynchronizationMechanism>, SyncError> {
        for mechanism in &self.mechanisms {
            if mechanism.is_valid_for(candidate).await? {
                return Ok(Some(mechanism));
            }
        }
        Ok(None)
    }
}
