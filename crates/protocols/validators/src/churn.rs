//! Churn arithmetic
//!
//! Pure helpers used when rotating the validator set. Nothing here touches
//! the store.

use asgard_core::types::constants::ONE;
use asgard_core::{BlockHeight, NodeAccount};

/// Smallest validator set the network can run with
const MIN_BFT_NODES: usize = 4;

/// Behaviour score since the last churn; lower is worse.
///
/// `(height - last_churn) * ONE / slash_points`, unscaled when the node has
/// no slash points.
pub fn get_score(height: BlockHeight, slash_points: i64, last_churn_height: BlockHeight) -> u64 {
    let blocks = (height - last_churn_height).max(0) as u64;
    let score = blocks.saturating_mul(ONE);
    if slash_points <= 0 {
        return score;
    }
    score / slash_points as u64
}

/// Most nodes that may leave a set of `count` while keeping a two-thirds
/// plus one majority and at least the BFT minimum.
pub fn find_max_able_to_leave(count: usize) -> usize {
    let majority = count * 2 / 3 + 1;
    let max = count.saturating_sub(majority);
    max.min(count.saturating_sub(MIN_BFT_NODES))
}

/// How many of the sorted active nodes leave in this churn.
///
/// Forced and requested departures are honoured up to a third of the set;
/// nodes marked only by leave score fill the remaining room under
/// [`find_max_able_to_leave`].
pub fn find_count_to_remove(active: &[NodeAccount]) -> usize {
    let wants_out = |na: &NodeAccount| na.forced_to_leave || na.requested_to_leave;
    let leaving = active.iter().filter(|na| wants_out(na)).count().min(active.len() / 3);
    let marked = active
        .iter()
        .filter(|na| !wants_out(na) && na.leave_score > 0)
        .count();
    let room = find_max_able_to_leave(active.len()).saturating_sub(leaving);
    leaving + marked.min(room)
}

/// Bond ceiling used for reward weighting: the bond two thirds of the way
/// up the ascending bond list.
pub fn get_hard_bond_cap(nodes: &[NodeAccount]) -> u64 {
    if nodes.is_empty() {
        return 0;
    }
    let mut bonds: Vec<u64> = nodes.iter().map(|na| na.bond).collect();
    bonds.sort_unstable();
    let mut i = bonds.len() * 2 / 3;
    if bonds.len() % 3 == 0 {
        i -= 1;
    }
    bonds[i]
}

/// Split the next validator set into asgard groups of near-equal size.
///
/// Nodes are dealt round-robin in descending bond order. Returns no groups
/// when the split would produce a group above `asgard_size`, below two
/// members, or groups differing in size by more than one.
pub fn split_next(mut nodes: Vec<NodeAccount>, asgard_size: usize) -> Vec<Vec<NodeAccount>> {
    let asgard_size = asgard_size.max(1);
    let group_num = nodes.len().div_ceil(asgard_size);
    if group_num == 0 {
        return Vec::new();
    }

    nodes.sort_by(|a, b| b.bond.cmp(&a.bond));
    let mut groups: Vec<Vec<NodeAccount>> = vec![Vec::new(); group_num];
    for (i, na) in nodes.into_iter().enumerate() {
        groups[i % group_num].push(na);
    }

    for (i, group) in groups.iter().enumerate() {
        if group.len() > asgard_size {
            tracing::info!("skipping rotation, an asgard group is larger than the max size");
            return Vec::new();
        }
        if group.len() < 2 {
            tracing::info!("skipping rotation, an asgard group is smaller than the min size");
            return Vec::new();
        }
        if i > 0 && group.len().abs_diff(groups[i - 1].len()) > 1 {
            tracing::info!("skipping rotation, asgard groups have dissimilar sizes");
            return Vec::new();
        }
    }
    groups
}
