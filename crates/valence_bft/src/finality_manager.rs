use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, instrument, trace};
use valence_chain_types::{BlockHeader, BlockHeight, DelegatePublicKey};

use crate::config::BftConfig;
use crate::errors::BftError;
use crate::header_window::HeaderWindow;
use crate::metrics::{record_heights, record_invalid_header};
use crate::vote_threshold::FINALITY_THRESHOLD;

#[cfg(test)]
#[path = "finality_manager_test.rs"]
mod finality_manager_test;

/// Per-delegate vote markers. A delegate's contributions per header are
/// contiguous height ranges resuming right after these, which is what keeps
/// its influence at any height bounded to a single vote.
#[derive(Clone, Copy, Debug, Default)]
struct DelegateVoteState {
    max_prevote_height: BlockHeight,
    max_precommit_height: BlockHeight,
}

/// The finality engine: a sliding window of headers, the pre-vote and
/// pre-commit tallies they imply, and the two confirmed heights derived from
/// those tallies.
///
/// Constructed once per process, seeded from persisted state via [`Self::restore`],
/// and mutated only by [`Self::add_header`] (consensus-forward) and
/// [`Self::remove_headers_after`] (consensus-rewind, used by the
/// synchronization mechanisms).
#[derive(Debug)]
pub struct FinalityManager {
    config: BftConfig,
    window: HeaderWindow,
    pre_votes: BTreeMap<BlockHeight, u32>,
    pre_commits: BTreeMap<BlockHeight, u32>,
    delegate_state: HashMap<DelegatePublicKey, DelegateVoteState>,
    finalized_height: BlockHeight,
    prevoted_confirmed_height: BlockHeight,
}

impl FinalityManager {
    pub fn new(config: BftConfig, finalized_height: BlockHeight) -> Self {
        let capacity = usize::try_from(config.window_capacity()).unwrap_or(usize::MAX);
        Self {
            window: HeaderWindow::new(capacity),
            pre_votes: BTreeMap::new(),
            pre_commits: BTreeMap::new(),
            delegate_state: HashMap::new(),
            finalized_height,
            prevoted_confirmed_height: finalized_height,
            config,
        }
    }

    /// Reseeds the window from a persisted suffix of the chain, in ascending
    /// height order, and replays the vote accounting over it. The seed
    /// headers were already verified when first applied, so they are not
    /// re-verified here.
    pub fn restore(
        &mut self,
        headers: impl IntoIterator<Item = BlockHeader>,
    ) -> Result<(), BftError> {
        for header in headers {
            self.window.push(header)?;
        }
        self.recompute();
        info!(
            finalized_height = %self.finalized_height,
            prevoted_confirmed_height = %self.prevoted_confirmed_height,
            window_len = self.window.len(),
            "Restored finality state from persisted headers",
        );
        Ok(())
    }

    /// Verifies `header`, inserts it into the window and applies its votes.
    /// On failure the header is not added and no state changes.
    #[instrument(skip(self, header), fields(height = %header.height), level = "debug")]
    pub fn add_header(&mut self, header: BlockHeader) -> Result<(), BftError> {
        self.try_add_header(header).inspect_err(record_invalid_header)
    }

    fn try_add_header(&mut self, header: BlockHeader) -> Result<(), BftError> {
        self.verify_header(&header)?;
        if let Some(evicted) = self.window.push(header.clone())? {
            trace!(height = %evicted.height, "Evicted oldest header from the window");
        }
        self.update_votes(&header);
        // Tally entries below the window can no longer affect the
        // confirmation scans; drop them.
        let cutoff = self.window.oldest().map(|oldest| oldest.height);
        if let Some(cutoff) = cutoff {
            self.prune_tallies_below(cutoff);
        }
        self.advance_confirmed_heights();
        record_heights(self.finalized_height, self.prevoted_confirmed_height, self.window.len());
        Ok(())
    }

    /// Checks `header` against the consensus safety rules without mutating
    /// any state.
    ///
    /// In order: the claimed `max_height_prevoted` must match the chain's
    /// prevoted confirmed height once the window spans a full processing
    /// window; and against the delegate's most recent header (if any within
    /// the processing window), the header must advance past it, acknowledge
    /// it, and not regress its pre-vote knowledge.
    pub fn verify_header(&self, header: &BlockHeader) -> Result<(), BftError> {
        let processing_window = self.config.processing_window();
        let window_is_full =
            u64::try_from(self.window.len()).unwrap_or(u64::MAX) >= processing_window;
        if window_is_full && header.max_height_prevoted != self.prevoted_confirmed_height {
            return Err(BftError::WrongPrevotedHeight {
                claimed: header.max_height_prevoted,
                expected: self.prevoted_confirmed_height,
            });
        }

        let search_span = usize::try_from(processing_window).unwrap_or(usize::MAX);
        let Some(last) = self
            .window
            .iter_newest_first()
            .take(search_span)
            .find(|previous| previous.delegate == header.delegate)
        else {
            // No recent header from this delegate; nothing to cross-check.
            return Ok(());
        };

        if last.max_height_previously_forged == header.max_height_previously_forged
            && last.height >= header.height
        {
            return Err(BftError::ForkChoiceViolation {
                delegate: header.delegate,
                last_height: last.height,
                height: header.height,
            });
        }
        if last.height > header.max_height_previously_forged {
            return Err(BftError::DisjointnessViolation {
                delegate: header.delegate,
                last_height: last.height,
                claimed: header.max_height_previously_forged,
            });
        }
        if last.max_height_prevoted > header.max_height_prevoted {
            return Err(BftError::PrevoteMonotonicityViolation {
                delegate: header.delegate,
                last_prevoted: last.max_height_prevoted,
                claimed: header.max_height_prevoted,
            });
        }
        Ok(())
    }

    /// Rewinds the window to `height` and rebuilds the tallies. Refused at or
    /// below the finalized height; that bound is enforced here, not by caller
    /// discipline.
    pub fn remove_headers_after(&mut self, height: BlockHeight) -> Result<(), BftError> {
        if height <= self.finalized_height {
            return Err(BftError::BelowFinalizedHeight {
                requested: height,
                finalized: self.finalized_height,
            });
        }
        debug!(%height, "Removing headers above height");
        self.window.remove_after(height);
        self.recompute();
        Ok(())
    }

    /// Rebuilds the tallies and the delegate markers from scratch by
    /// replaying the window in height order, then re-derives the confirmed
    /// heights. Produces the same tallies as incremental accounting over the
    /// same headers. The finalized height never moves backwards.
    pub fn recompute(&mut self) {
        self.pre_votes.clear();
        self.pre_commits.clear();
        self.delegate_state.clear();
        let headers: Vec<BlockHeader> = self.window.iter().cloned().collect();
        for header in &headers {
            self.update_votes(header);
        }
        // The pre-voted height tracks the surviving window's evidence and may
        // drop below the finalized height after a deep rewind; replayed
        // headers claim exactly the value derivable from the shared prefix,
        // so flooring it at finality would break header verification there.
        self.prevoted_confirmed_height =
            self.highest_meeting_threshold(&self.pre_votes).unwrap_or_default();
        let recomputed_finalized =
            self.highest_meeting_threshold(&self.pre_commits).unwrap_or_default();
        self.finalized_height = self.finalized_height.max(recomputed_finalized);
        record_heights(self.finalized_height, self.prevoted_confirmed_height, self.window.len());
    }

    pub fn finalized_height(&self) -> BlockHeight {
        self.finalized_height
    }

    pub fn prevoted_confirmed_height(&self) -> BlockHeight {
        self.prevoted_confirmed_height
    }

    /// The `max_height_prevoted` value a locally forged header must carry.
    pub fn chain_max_height_prevoted(&self) -> BlockHeight {
        self.prevoted_confirmed_height
    }

    pub fn window(&self) -> &HeaderWindow {
        &self.window
    }

    pub fn config(&self) -> &BftConfig {
        &self.config
    }

    pub fn pre_vote_count(&self, height: BlockHeight) -> u32 {
        self.pre_votes.get(&height).copied().unwrap_or(0)
    }

    pub fn pre_commit_count(&self, height: BlockHeight) -> u32 {
        self.pre_commits.get(&height).copied().unwrap_or(0)
    }

    /// Applies the implicit votes carried by `header`.
    fn update_votes(&mut self, header: &BlockHeader) {
        if header.max_height_previously_forged >= header.height {
            // The forger claims to have already forged at or above this
            // height, so it is provably operating on another chain; none of
            // its votes count here. Not a fault.
            debug!(
                height = %header.height,
                previously_forged = %header.max_height_previously_forged,
                delegate = %header.delegate,
                "Skipping vote accounting for conflicting forger claim",
            );
            return;
        }

        let total = self.config.round_length;
        let processing_window = self.config.processing_window();
        let min_active = header.delegate_min_height_active;
        let state = self.delegate_state.entry(header.delegate).or_default();

        // Pre-commit pass: one pre-commit for every height below the
        // header's own that already cleared the pre-vote threshold, resuming
        // where this delegate's pre-commits ended. Heights that have not
        // cleared the threshold yet stay eligible for later headers.
        let precommit_from = min_active.max(state.max_precommit_height.unchecked_next());
        for height in precommit_from.iter_up_to(header.height) {
            let pre_votes = self.pre_votes.get(&height).copied().unwrap_or(0);
            if FINALITY_THRESHOLD.is_met(pre_votes.into(), total) {
                *self.pre_commits.entry(height).or_insert(0) += 1;
                state.max_precommit_height = height;
            }
        }

        // Pre-vote pass: one pre-vote per height from the first height this
        // header's claims are consistent with, up to the header itself,
        // bounded below by the processing window.
        let prevote_from = min_active
            .max(header.max_height_previously_forged.unchecked_next())
            .max(state.max_prevote_height.unchecked_next())
            .max(header.height.saturating_sub(processing_window));
        for height in prevote_from.iter_up_to(header.height.unchecked_next()) {
            *self.pre_votes.entry(height).or_insert(0) += 1;
        }
        state.max_prevote_height = header.height;
    }

    /// Re-derives both confirmed heights from the tallies. The new values
    /// need not be adjacent to the old ones: after a rewind the tallies
    /// rebuild from the rewind point and the first height to clear the
    /// threshold again may sit well above the previous confirmed height.
    fn advance_confirmed_heights(&mut self) {
        let previous_finalized = self.finalized_height;

        // Both heights are sticky when no tally currently meets the
        // threshold, and the finalized height never moves backwards.
        if let Some(prevoted) = self.highest_meeting_threshold(&self.pre_votes) {
            self.prevoted_confirmed_height = prevoted;
        }
        if let Some(finalized) = self.highest_meeting_threshold(&self.pre_commits) {
            self.finalized_height = self.finalized_height.max(finalized);
        }

        if self.finalized_height > previous_finalized {
            info!(finalized_height = %self.finalized_height, "Finalized height advanced");
        }
    }

    /// Highest height whose tally meets the threshold, if any.
    fn highest_meeting_threshold(
        &self,
        tallies: &BTreeMap<BlockHeight, u32>,
    ) -> Option<BlockHeight> {
        let total = self.config.round_length;
        tallies
            .iter()
            .rev()
            .find(|(_, &count)| FINALITY_THRESHOLD.is_met(count.into(), total))
            .map(|(&height, _)| height)
    }

    fn prune_tallies_below(&mut self, cutoff: BlockHeight) {
        let kept = self.pre_votes.split_off(&cutoff);
        self.pre_votes = kept;
        let kept = self.pre_commits.split_off(&cutoff);
        self.pre_commits = kept;
    }
}
