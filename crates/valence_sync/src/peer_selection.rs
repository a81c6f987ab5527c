//! Pure aggregation of peer-reported chain tips.

use std::collections::BTreeMap;

use valence_chain_types::BlockId;

use crate::network::PeerInfo;

#[cfg(test)]
#[path = "peer_selection_test.rs"]
mod peer_selection_test;

/// Selects the peers whose claimed tip the node should synchronize towards.
///
/// Filters to the maximal claimed prevoted-confirmed height, then to the
/// maximal claimed chain height, then groups by last block id and keeps the
/// largest group. A minority of peers lying about their chain state cannot
/// steer the selection as long as the honest majority agrees on a tip.
pub fn select_best_peers(peers: &[PeerInfo]) -> Vec<PeerInfo> {
    let Some(best_prevoted) = peers.iter().map(|peer| peer.prevoted_confirmed_upto_height).max()
    else {
        return Vec::new();
    };
    let by_prevoted: Vec<&PeerInfo> = peers
        .iter()
        .filter(|peer| peer.prevoted_confirmed_upto_height == best_prevoted)
        .collect();

    let Some(best_height) = by_prevoted.iter().map(|peer| peer.height).max() else {
        return Vec::new();
    };

    let mut groups: BTreeMap<BlockId, Vec<PeerInfo>> = BTreeMap::new();
    for peer in by_prevoted.into_iter().filter(|peer| peer.height == best_height) {
        groups.entry(peer.last_block_id).or_default().push(peer.clone());
    }

    // The map iterates block ids in ascending order, so requiring a strictly
    // larger group keeps the smallest id when two groups tie on size.
    let mut best: Vec<PeerInfo> = Vec::new();
    for group in groups.into_values() {
        if group.len() > best.len() {
            best = group;
        }
    }
    best
}
