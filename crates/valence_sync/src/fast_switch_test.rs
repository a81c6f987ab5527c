use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use valence_bft::{BftConfig, FinalityManager};
use valence_chain::roster::MockDelegateRoster;
use valence_chain::test_utils::{InMemoryChainStore, ScriptedExecutor};
use valence_chain::{
    chain_event_channel,
    BlockProcessor,
    ChainEventReceiver,
    SharedBlockExecutor,
    SharedChainStore,
};
use valence_chain_types::test_utils::{test_block_id, test_delegate, HeaderBuilder};
use valence_chain_types::{Block, BlockHeight, BlockId, PeerId, Round, SlotSchedule, Timestamp};

use crate::config::SyncConfig;
use crate::errors::{SyncControl, SyncError};
use crate::fast_switch::FastChainSwitchingMechanism;
use crate::mechanism::SynchronizationMechanism;
use crate::network::MockSyncNetworkClient;

const ROUND_LENGTH: u64 = 11;
const LOCAL_TIP: u64 = 60;
/// Finalized height persisted before the node wandered onto its own branch.
const FINALIZED: u64 = 45;
/// First height above the prefix both branches share.
const BRANCH_START: u64 = 55;
/// Height of the peer block that triggers the switch.
const CANDIDATE: u64 = 58;
/// Id offsets marking the two competing branches.
const LOCAL_ID_BASE: u64 = 1_000_000;
const PEER_ID_BASE: u64 = 2_000_000;

fn config() -> BftConfig {
    BftConfig { round_length: ROUND_LENGTH }
}

fn slots() -> SlotSchedule {
    SlotSchedule::new(Timestamp(0), 10)
}

/// A block of the canonical chain: delegates rotate round-robin and every
/// header's claims are consistent with that history.
fn canonical_block(height: u64) -> Block {
    let delegate = u8::try_from((height - 1) % ROUND_LENGTH).unwrap();
    let previously_forged = if height > ROUND_LENGTH { height - ROUND_LENGTH } else { 0 };
    HeaderBuilder::at_height(height)
        .delegate(delegate)
        .previously_forged(previously_forged)
        .prevoted(height.saturating_sub(8))
        .build_block()
}

/// A branch block above the shared prefix: the same round-robin forging
/// pattern and claims as the canonical chain, with ids offset by `id_base`.
fn branch_block(height: u64, id_base: u64) -> Block {
    let delegate = u8::try_from((height - 1) % ROUND_LENGTH).unwrap();
    let previous = if height == BRANCH_START { height - 1 } else { id_base + height - 1 };
    HeaderBuilder::at_height(height)
        .id(id_base + height)
        .previous_id(previous)
        .delegate(delegate)
        .previously_forged(height - ROUND_LENGTH)
        .prevoted(height - 8)
        .build_block()
}

fn local_branch_block(height: u64) -> Block {
    branch_block(height, LOCAL_ID_BASE)
}

fn peer_branch_block(height: u64) -> Block {
    branch_block(height, PEER_ID_BASE)
}

/// Shared prefix up to height 54, local six-block branch above it.
fn local_chain() -> Vec<Block> {
    (1..BRANCH_START)
        .map(canonical_block)
        .chain((BRANCH_START..=LOCAL_TIP).map(local_branch_block))
        .collect()
}

/// The first probe chunk at tip 60: the six branch ids, then the shared
/// prefix down to height 51.
fn expected_first_chunk_ids() -> Vec<BlockId> {
    (51..=LOCAL_TIP)
        .rev()
        .map(|height| {
            if height >= BRANCH_START {
                test_block_id(LOCAL_ID_BASE + height)
            } else {
                test_block_id(height)
            }
        })
        .collect()
}

/// A network whose peer answers the first probe with the branch point at
/// height 54 and serves its four-block branch in one fetch.
fn switching_network() -> MockSyncNetworkClient {
    let mut network = MockSyncNetworkClient::new();
    let expected_ids = expected_first_chunk_ids();
    network
        .expect_request_highest_common_block()
        .withf(move |_, ids| *ids == expected_ids)
        .times(1)
        .returning(|_, _| Ok(Some(canonical_block(BRANCH_START - 1).header)));
    network
        .expect_request_blocks_from_id()
        .withf(|_, from, _| *from == test_block_id(BRANCH_START - 1))
        .times(1)
        .returning(|_, _, _| Ok((BRANCH_START..=CANDIDATE).map(peer_branch_block).collect()));
    network
}

struct Harness {
    mechanism: FastChainSwitchingMechanism,
    store: Arc<InMemoryChainStore>,
    processor: Arc<BlockProcessor>,
    // Keeps the event channel open for the duration of a test.
    _events: ChainEventReceiver,
}

fn harness(
    network: MockSyncNetworkClient,
    executor: ScriptedExecutor,
    roster: MockDelegateRoster,
) -> Harness {
    let store = Arc::new(InMemoryChainStore::with_blocks(local_chain()));
    let shared_store: SharedChainStore = store.clone();
    let shared_executor: SharedBlockExecutor = Arc::new(executor);

    let mut finality = FinalityManager::new(config(), BlockHeight(FINALIZED));
    finality
        .restore(
            (6..BRANCH_START)
                .map(|height| canonical_block(height).header)
                .chain((BRANCH_START..=LOCAL_TIP).map(|height| local_branch_block(height).header)),
        )
        .unwrap();

    let (events, receiver) = chain_event_channel();
    let processor = Arc::new(BlockProcessor::new(
        finality,
        shared_store.clone(),
        shared_executor.clone(),
        slots(),
        events,
    ));
    let mechanism = FastChainSwitchingMechanism::new(
        SyncConfig::default(),
        processor.clone(),
        shared_store,
        shared_executor,
        Arc::new(network),
        Arc::new(roster),
    );
    Harness { mechanism, store, processor, _events: receiver }
}

#[tokio::test]
async fn switches_onto_the_peers_branch() {
    let harness =
        harness(switching_network(), ScriptedExecutor::default(), MockDelegateRoster::new());

    harness.mechanism.run(&peer_branch_block(CANDIDATE), PeerId(5)).await.unwrap();

    let expected: Vec<Block> = (1..BRANCH_START)
        .map(canonical_block)
        .chain((BRANCH_START..=CANDIDATE).map(peer_branch_block))
        .collect();
    assert_eq!(harness.store.all_blocks(), expected);
    assert_eq!(harness.store.backed_up_len(), 0);
    // The whole switch happens above finality; the finalized height holds.
    assert_eq!(harness.processor.finalized_height().await, BlockHeight(FINALIZED));
    assert_eq!(harness.processor.prevoted_confirmed_height().await, BlockHeight(51));
}

#[tokio::test]
async fn accepts_a_nearby_block_from_a_scheduled_forger() {
    let mut roster = MockDelegateRoster::new();
    roster
        .expect_forgers_for_round()
        .withf(|round| *round == Round(8))
        .times(1)
        .returning(|_| Ok((0..11).map(test_delegate).collect()));
    let harness = harness(MockSyncNetworkClient::new(), ScriptedExecutor::default(), roster);

    // Height 82 sits exactly two rounds above the tip at 60.
    assert!(harness.mechanism.is_valid_for(&canonical_block(82)).await.unwrap());
}

#[tokio::test]
async fn rejects_beyond_the_switch_span_without_consulting_the_roster() {
    // No roster expectations: a forger lookup would fail the test.
    let harness = harness(
        MockSyncNetworkClient::new(),
        ScriptedExecutor::default(),
        MockDelegateRoster::new(),
    );

    assert!(!harness.mechanism.is_valid_for(&canonical_block(83)).await.unwrap());
}

#[tokio::test]
async fn rejects_a_forger_missing_from_the_round_roster() {
    let mut roster = MockDelegateRoster::new();
    roster.expect_forgers_for_round().times(1).returning(|_| Ok(vec![test_delegate(0)]));
    let harness = harness(MockSyncNetworkClient::new(), ScriptedExecutor::default(), roster);

    // Height 82 is forged by delegate 4 in the round-robin pattern.
    assert!(!harness.mechanism.is_valid_for(&canonical_block(82)).await.unwrap());
}

#[tokio::test]
async fn penalizes_a_peer_sharing_no_recent_history() {
    let mut network = MockSyncNetworkClient::new();
    // Two full chunks of ten ids and a final pair cover the whole span.
    network.expect_request_highest_common_block().times(3).returning(|_, _| Ok(None));
    network
        .expect_apply_penalty()
        .withf(|peer, score| (*peer, *score) == (PeerId(5), 100))
        .times(1)
        .returning(|_, _| Ok(()));
    let harness = harness(network, ScriptedExecutor::default(), MockDelegateRoster::new());

    assert_matches!(
        harness.mechanism.run(&peer_branch_block(CANDIDATE), PeerId(5)).await,
        Err(SyncError::Control(SyncControl::Restart { .. }))
    );
    assert_eq!(harness.store.all_blocks(), local_chain());
}

#[tokio::test]
async fn penalizes_a_peer_sharing_only_finalized_history() {
    let mut network = MockSyncNetworkClient::new();
    let mut probes = 0;
    network.expect_request_highest_common_block().times(2).returning(move |_, _| {
        probes += 1;
        if probes == 1 { Ok(None) } else { Ok(Some(canonical_block(FINALIZED).header)) }
    });
    network.expect_apply_penalty().times(1).returning(|_, _| Ok(()));
    let harness = harness(network, ScriptedExecutor::default(), MockDelegateRoster::new());

    assert_matches!(
        harness.mechanism.run(&peer_branch_block(CANDIDATE), PeerId(5)).await,
        Err(SyncError::Control(SyncControl::Restart { .. }))
    );
    assert_eq!(harness.store.all_blocks(), local_chain());
    assert_eq!(harness.processor.finalized_height().await, BlockHeight(FINALIZED));
}

#[tokio::test]
async fn aborts_without_blame_when_the_branch_point_is_too_deep() {
    let mut network = MockSyncNetworkClient::new();
    let mut probes = 0;
    network.expect_request_highest_common_block().times(2).returning(move |_, _| {
        probes += 1;
        if probes == 1 { Ok(None) } else { Ok(Some(canonical_block(46).header)) }
    });
    // No penalty expectation: a deep branch point is not peer misbehavior.
    let harness = harness(network, ScriptedExecutor::default(), MockDelegateRoster::new());

    // Height 46 clears finality but leaves a 36-block climb to the trigger
    // block at 82, well past the two-round switch span.
    assert_matches!(
        harness.mechanism.run(&canonical_block(82), PeerId(5)).await,
        Err(SyncError::Control(SyncControl::Abort { .. }))
    );
    assert_eq!(harness.store.all_blocks(), local_chain());
}

#[tokio::test]
async fn penalizes_a_peer_serving_an_empty_switch_span() {
    let mut network = MockSyncNetworkClient::new();
    network
        .expect_request_highest_common_block()
        .times(1)
        .returning(|_, _| Ok(Some(canonical_block(BRANCH_START - 1).header)));
    network.expect_request_blocks_from_id().times(1).returning(|_, _, _| Ok(vec![]));
    network.expect_apply_penalty().times(1).returning(|_, _| Ok(()));
    let harness = harness(network, ScriptedExecutor::default(), MockDelegateRoster::new());

    assert_matches!(
        harness.mechanism.run(&peer_branch_block(CANDIDATE), PeerId(5)).await,
        Err(SyncError::Control(SyncControl::Restart { .. }))
    );
    // Fetching precedes the rewind, so the chain never moved.
    assert_eq!(harness.store.all_blocks(), local_chain());
    assert_eq!(harness.store.backed_up_len(), 0);
}

#[tokio::test]
async fn reports_an_invalid_branch_without_touching_the_chain() {
    let mut network = MockSyncNetworkClient::new();
    network
        .expect_request_highest_common_block()
        .times(1)
        .returning(|_, _| Ok(Some(canonical_block(BRANCH_START - 1).header)));
    network
        .expect_request_blocks_from_id()
        .times(1)
        .returning(|_, _, _| Ok((BRANCH_START..=CANDIDATE).map(peer_branch_block).collect()));
    // No apply_penalty expectation: the synchronizer owns the penalty for
    // this verdict.
    let executor = ScriptedExecutor {
        fail_validation_on: Some(test_block_id(PEER_ID_BASE + 57)),
        ..Default::default()
    };
    let harness = harness(network, executor, MockDelegateRoster::new());

    assert_matches!(
        harness.mechanism.run(&peer_branch_block(CANDIDATE), PeerId(5)).await,
        Err(SyncError::Control(SyncControl::PenalizeAndAbort { peer: PeerId(5), .. }))
    );
    // The branch is validated in full before the rewind.
    assert_eq!(harness.store.all_blocks(), local_chain());
    assert_eq!(harness.store.backed_up_len(), 0);
}

#[tokio::test]
async fn restores_the_local_branch_when_the_switch_fails_midway() {
    let executor = ScriptedExecutor {
        fail_apply_on: Some(test_block_id(PEER_ID_BASE + 57)),
        ..Default::default()
    };
    let harness = harness(switching_network(), executor, MockDelegateRoster::new());

    assert_matches!(
        harness.mechanism.run(&peer_branch_block(CANDIDATE), PeerId(5)).await,
        Err(SyncError::Control(SyncControl::PenalizeAndAbort { peer: PeerId(5), .. }))
    );
    // The rewound branch came back from the backup, byte for byte.
    assert_eq!(harness.store.all_blocks(), local_chain());
    assert_eq!(harness.store.backed_up_len(), 0);
    assert_eq!(harness.processor.finalized_height().await, BlockHeight(FINALIZED));
}
