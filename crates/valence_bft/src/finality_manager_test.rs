use assert_matches::assert_matches;
use lazy_static::lazy_static;
use pretty_assertions::assert_eq;
use valence_chain_types::test_utils::HeaderBuilder;
use valence_chain_types::{BlockHeader, BlockHeight};

use crate::config::BftConfig;
use crate::errors::BftError;
use crate::finality_manager::FinalityManager;

// Eleven delegates: threshold ceil(2 * 11 / 3) = 8, processing window 32,
// window capacity 55.
lazy_static! {
    static ref CONFIG: BftConfig = BftConfig { round_length: 11 };
}

fn manager() -> FinalityManager {
    FinalityManager::new(CONFIG.clone(), BlockHeight(0))
}

/// Headers of an honest chain forged round-robin by delegates 0..=10: each
/// delegate's previous forging height is 11 back, and each header stamps the
/// prevoted confirmed height as of its parent.
fn round_robin_header(height: u64) -> BlockHeader {
    let delegate = u8::try_from((height - 1) % 11).unwrap();
    let previously_forged = if height > 11 { height - 11 } else { 0 };
    HeaderBuilder::at_height(height)
        .delegate(delegate)
        .previously_forged(previously_forged)
        .prevoted(height.saturating_sub(8))
        .build()
}

// On the honest round-robin chain the 8th pre-vote for height j arrives with
// header j + 7, and the 8th pre-commit with header j + 15 (heights 1..=4 all
// mature together once pre-commits start at header 12).
fn expected_prevoted(height: u64) -> u64 {
    height.saturating_sub(7)
}

fn expected_finalized(height: u64) -> u64 {
    if height < 19 {
        0
    } else {
        height - 15
    }
}

#[test]
fn eleven_delegate_trace_reproduces_finality_sequence() {
    let mut manager = manager();
    let mut finalized_trace = Vec::new();
    for height in 1..=50 {
        manager.add_header(round_robin_header(height)).unwrap();
        assert_eq!(
            manager.prevoted_confirmed_height(),
            BlockHeight(expected_prevoted(height)),
            "prevoted confirmed height after header {height}",
        );
        finalized_trace.push(manager.finalized_height().0);
    }

    let expected: Vec<u64> = (1..=50).map(expected_finalized).collect();
    assert_eq!(finalized_trace, expected);
    assert_eq!(manager.finalized_height(), BlockHeight(35));
    assert_eq!(manager.prevoted_confirmed_height(), BlockHeight(43));

    // No delegate's influence is ever counted twice at a height.
    for height in 1..=50 {
        assert!(manager.pre_vote_count(BlockHeight(height)) <= 11);
        assert!(manager.pre_commit_count(BlockHeight(height)) <= 11);
    }
}

#[test]
fn confirmed_heights_never_decrease() {
    let mut manager = manager();
    let mut last_finalized = BlockHeight(0);
    let mut last_prevoted = BlockHeight(0);
    for height in 1..=50 {
        manager.add_header(round_robin_header(height)).unwrap();
        assert!(manager.finalized_height() >= last_finalized);
        assert!(manager.prevoted_confirmed_height() >= last_prevoted);
        assert!(manager.finalized_height() <= manager.prevoted_confirmed_height());
        assert!(manager.prevoted_confirmed_height() <= BlockHeight(height));
        last_finalized = manager.finalized_height();
        last_prevoted = manager.prevoted_confirmed_height();
    }
}

#[test]
fn conflicting_forger_claim_skips_vote_accounting() {
    let mut manager = manager();
    for height in 1..=20 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    let tallies_before: Vec<(u32, u32)> = (1..=21)
        .map(|h| (manager.pre_vote_count(BlockHeight(h)), manager.pre_commit_count(BlockHeight(h))))
        .collect();

    // A delegate claiming to have already forged at height 25 submits a
    // header at height 21.
    let conflicting = HeaderBuilder::at_height(21)
        .delegate(12)
        .previously_forged(25)
        .prevoted(13)
        .build();
    manager.add_header(conflicting).unwrap();

    // The header is in the window but contributed nothing to the tallies.
    assert_eq!(manager.window().latest().unwrap().height, BlockHeight(21));
    let tallies_after: Vec<(u32, u32)> = (1..=21)
        .map(|h| (manager.pre_vote_count(BlockHeight(h)), manager.pre_commit_count(BlockHeight(h))))
        .collect();
    assert_eq!(tallies_before, tallies_after);
    assert_eq!(manager.prevoted_confirmed_height(), BlockHeight(13));
    assert_eq!(manager.finalized_height(), BlockHeight(5));
}

#[test]
fn recompute_matches_incremental_tallies() {
    let mut manager = manager();
    for height in 1..=40 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    let finalized = manager.finalized_height();
    let prevoted = manager.prevoted_confirmed_height();
    let tallies: Vec<(u32, u32)> = (1..=40)
        .map(|h| (manager.pre_vote_count(BlockHeight(h)), manager.pre_commit_count(BlockHeight(h))))
        .collect();

    manager.recompute();

    assert_eq!(manager.finalized_height(), finalized);
    assert_eq!(manager.prevoted_confirmed_height(), prevoted);
    let recomputed: Vec<(u32, u32)> = (1..=40)
        .map(|h| (manager.pre_vote_count(BlockHeight(h)), manager.pre_commit_count(BlockHeight(h))))
        .collect();
    assert_eq!(tallies, recomputed);
}

#[test]
fn rewind_replays_to_the_incremental_state() {
    let mut rewound = manager();
    for height in 1..=50 {
        rewound.add_header(round_robin_header(height)).unwrap();
    }
    rewound.remove_headers_after(BlockHeight(40)).unwrap();

    let mut fresh = manager();
    for height in 1..=40 {
        fresh.add_header(round_robin_header(height)).unwrap();
    }

    assert_eq!(rewound.window().latest().unwrap().height, BlockHeight(40));
    for height in 1..=40 {
        assert_eq!(
            rewound.pre_vote_count(BlockHeight(height)),
            fresh.pre_vote_count(BlockHeight(height)),
            "pre-vote tally at height {height}",
        );
    }
    // The replayed window supports the same pre-voted height a from-scratch
    // run over the surviving headers derives.
    assert_eq!(rewound.prevoted_confirmed_height(), fresh.prevoted_confirmed_height());
    assert_eq!(rewound.prevoted_confirmed_height(), BlockHeight(33));
    // The finalized height survives the rewind even though the replayed
    // window alone only supports a lower one.
    assert_eq!(rewound.finalized_height(), BlockHeight(35));
    assert_eq!(fresh.finalized_height(), BlockHeight(25));
}

#[test]
fn rewind_that_empties_the_window_recovers_finality_above_the_gap() {
    // A node that persisted finality at 20 restarts with only a short window
    // suffix, then a synchronization rewind drops that suffix entirely.
    let mut manager = FinalityManager::new(CONFIG.clone(), BlockHeight(20));
    manager.restore((30..=34).map(round_robin_header)).unwrap();
    assert_eq!(manager.finalized_height(), BlockHeight(20));
    // Five headers carry no threshold-clearing evidence of their own.
    assert_eq!(manager.prevoted_confirmed_height(), BlockHeight(0));

    manager.remove_headers_after(BlockHeight(29)).unwrap();
    assert_eq!(manager.window().len(), 0);
    assert_eq!(manager.finalized_height(), BlockHeight(20));

    // Replaying a chain from the rewind point rebuilds the tallies from
    // height 30 up; the confirmed heights jump the gap instead of crawling
    // through heights whose tallies are gone.
    for height in 30..=45 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    assert_eq!(manager.prevoted_confirmed_height(), BlockHeight(38));
    assert_eq!(manager.finalized_height(), BlockHeight(30));
}

#[test]
fn rewind_past_finality_is_rejected() {
    let mut manager = manager();
    for height in 1..=50 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    assert_eq!(manager.finalized_height(), BlockHeight(35));

    assert_matches!(
        manager.remove_headers_after(BlockHeight(35)),
        Err(BftError::BelowFinalizedHeight { .. })
    );
    assert_matches!(
        manager.remove_headers_after(BlockHeight(10)),
        Err(BftError::BelowFinalizedHeight { .. })
    );
    // A rejected rewind leaves the window intact.
    assert_eq!(manager.window().latest().unwrap().height, BlockHeight(50));

    manager.remove_headers_after(BlockHeight(36)).unwrap();
    assert_eq!(manager.window().latest().unwrap().height, BlockHeight(36));
}

#[test]
fn wrong_prevoted_height_is_rejected_once_window_is_full() {
    let mut manager = manager();
    for height in 1..=33 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    assert_eq!(manager.prevoted_confirmed_height(), BlockHeight(26));

    let wrong_claim = HeaderBuilder::at_height(34).delegate(0).prevoted(20).build();
    assert_matches!(
        manager.add_header(wrong_claim),
        Err(BftError::WrongPrevotedHeight { claimed: BlockHeight(20), expected: BlockHeight(26) })
    );
    // The rejected header was not added.
    assert_eq!(manager.window().latest().unwrap().height, BlockHeight(33));
}

#[test]
fn double_forge_pattern_is_rejected() {
    let mut manager = manager();
    for height in 1..=20 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    // Delegate 8 forged height 20 claiming previously-forged 9; a competing
    // header at the same height with the same claim is the classic double
    // forge.
    let competing =
        HeaderBuilder::at_height(20).id(999).delegate(8).previously_forged(9).prevoted(13).build();
    assert_matches!(
        manager.verify_header(&competing),
        Err(BftError::ForkChoiceViolation { last_height: BlockHeight(20), .. })
    );
}

#[test]
fn unacknowledged_own_chain_segment_is_rejected() {
    let mut manager = manager();
    for height in 1..=20 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    // Delegate 8's latest header is at height 20, but this new one claims it
    // never forged past 15.
    let disjoint =
        HeaderBuilder::at_height(21).delegate(8).previously_forged(15).prevoted(13).build();
    assert_matches!(
        manager.add_header(disjoint),
        Err(BftError::DisjointnessViolation {
            last_height: BlockHeight(20),
            claimed: BlockHeight(15),
            ..
        })
    );
}

#[test]
fn prevote_regression_is_rejected() {
    let mut manager = manager();
    for height in 1..=20 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    // Delegate 8 stamped max_height_prevoted 12 at height 20; claiming 5 now
    // regresses its pre-vote knowledge.
    let regressed =
        HeaderBuilder::at_height(21).delegate(8).previously_forged(20).prevoted(5).build();
    assert_matches!(
        manager.add_header(regressed),
        Err(BftError::PrevoteMonotonicityViolation {
            last_prevoted: BlockHeight(12),
            claimed: BlockHeight(5),
            ..
        })
    );
}

#[test]
fn unknown_delegate_is_trivially_accepted() {
    let mut manager = manager();
    for height in 1..=20 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    let newcomer =
        HeaderBuilder::at_height(21).delegate(42).prevoted(13).min_active(21).build();
    manager.verify_header(&newcomer).unwrap();
}

#[test]
fn restore_reseeds_from_persisted_suffix() {
    let mut original = manager();
    for height in 1..=50 {
        original.add_header(round_robin_header(height)).unwrap();
    }

    // A restarting node keeps the persisted finalized height and the last
    // processing window of headers.
    let suffix: Vec<BlockHeader> = (19..=50).map(round_robin_header).collect();
    let mut restored = FinalityManager::new(CONFIG.clone(), BlockHeight(35));
    restored.restore(suffix).unwrap();

    assert_eq!(restored.finalized_height(), original.finalized_height());
    assert_eq!(restored.prevoted_confirmed_height(), original.prevoted_confirmed_height());

    // The restored engine keeps accepting the chain where it left off.
    restored.add_header(round_robin_header(51)).unwrap();
    assert_eq!(restored.prevoted_confirmed_height(), BlockHeight(44));
}

#[test]
fn window_eviction_prunes_old_tallies_without_stalling_finality() {
    let mut manager = manager();
    for height in 1..=60 {
        manager.add_header(round_robin_header(height)).unwrap();
    }
    // Capacity 55: heights 1..=5 have been evicted and their tallies pruned.
    assert_eq!(manager.window().len(), 55);
    assert_eq!(manager.window().oldest().unwrap().height, BlockHeight(6));
    assert_eq!(manager.pre_vote_count(BlockHeight(5)), 0);
    assert!(manager.pre_vote_count(BlockHeight(6)) > 0);

    assert_eq!(manager.finalized_height(), BlockHeight(45));
    assert_eq!(manager.prevoted_confirmed_height(), BlockHeight(53));
}
