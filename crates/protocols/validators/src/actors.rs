//! Actor marking
//!
//! Finds the nodes that should leave in the next churn and records that
//! through their leave score. Also decides which standby nodes are ready
//! to join.

use std::net::IpAddr;

use asgard_core::{BlockHeight, ConstantName, NodeAccount, NodeStatus, Result, VaultStatus};
use asgard_store::Keeper;

use crate::churn::get_score;

/// Creation height of the newest active asgard, 0 before the first churn
pub fn last_churn_height(keeper: &Keeper) -> Result<BlockHeight> {
    Ok(keeper
        .get_asgard_vaults_by_status(VaultStatus::Active)?
        .iter()
        .map(|v| v.block_height)
        .max()
        .unwrap_or(0))
}

/// Record that a node should leave. An existing mark is kept.
pub fn mark_actor(keeper: &mut Keeper, mut na: NodeAccount, reason: &str) -> Result<()> {
    if na.leave_score > 0 {
        return Ok(());
    }
    let slash_points = keeper.get_node_account_slash_points(&na.node_address)?;
    let last_churn = last_churn_height(keeper)?;
    na.leave_score = get_score(keeper.height(), slash_points, last_churn).max(1);
    tracing::info!(node = %na.node_address, leave_score = na.leave_score, reason, "marked node to leave");
    keeper.set_node_account(&na)
}

/// Active nodes with the worst slash rate.
///
/// Only nodes above `MinSlashPointsForBadValidator` are considered. Those
/// scoring at or below the average score divided by
/// `BadValidatorRedline` are returned, worst first, capped at
/// `MaxNodeToChurnOutForBadActors`. When none crosses the redline the
/// single worst node is returned.
pub fn find_bad_actors(keeper: &Keeper) -> Result<Vec<NodeAccount>> {
    let min_slash = keeper.get_config_i64(ConstantName::MinSlashPointsForBadValidator);
    let redline = keeper.get_config_i64_min(ConstantName::BadValidatorRedline, 1) as u64;
    let max_bad = keeper.get_config_i64(ConstantName::MaxNodeToChurnOutForBadActors).max(0) as usize;
    if max_bad == 0 {
        return Ok(Vec::new());
    }

    let active = keeper.list_active_validators()?;
    let last_churn = last_churn_height(keeper)?;
    let height = keeper.height();

    let mut total: u128 = 0;
    let mut tracked: Vec<(u64, NodeAccount)> = Vec::new();
    for na in active.iter() {
        let slash_points = keeper.get_node_account_slash_points(&na.node_address)?;
        if slash_points <= min_slash {
            continue;
        }
        let score = get_score(height, slash_points, last_churn);
        total += u128::from(score);
        tracked.push((score, na.clone()));
    }
    if tracked.is_empty() {
        return Ok(Vec::new());
    }

    tracked.sort_by(|(a, na_a), (b, na_b)| a.cmp(b).then_with(|| na_a.node_address.cmp(&na_b.node_address)));
    // offenders' scores spread over the whole active set
    let avg = total / active.len() as u128;
    let red_score = avg / u128::from(redline);

    let bad: Vec<NodeAccount> = tracked
        .iter()
        .filter(|(score, _)| u128::from(*score) <= red_score)
        .take(max_bad)
        .map(|(_, na)| na.clone())
        .collect();
    if bad.is_empty() {
        return Ok(tracked.into_iter().take(1).map(|(_, na)| na).collect());
    }
    Ok(bad)
}

/// Active node that has been active longest
pub fn find_old_actor(keeper: &Keeper) -> Result<Option<NodeAccount>> {
    let height = keeper.height();
    Ok(keeper
        .list_active_validators()?
        .into_iter()
        .filter(|na| na.status_since < height)
        .min_by(|a, b| {
            a.status_since
                .cmp(&b.status_since)
                .then_with(|| a.node_address.cmp(&b.node_address))
        }))
}

/// Active node with the smallest bond
pub fn find_low_bond_actor(keeper: &Keeper) -> Result<Option<NodeAccount>> {
    Ok(keeper
        .list_active_validators()?
        .into_iter()
        .min_by(|a, b| a.bond.cmp(&b.bond).then_with(|| a.node_address.cmp(&b.node_address))))
}

/// Mark active nodes that have run below the join version for too long,
/// oldest first.
pub fn mark_low_version_validators(keeper: &mut Keeper) -> Result<()> {
    let max = keeper.get_config_i64(ConstantName::MaxNodeToChurnOutForLowVersion).max(0) as usize;
    let grace = keeper.get_config_i64(ConstantName::ChurnOutForLowVersionBlocks);
    let min_version = keeper.get_min_join_version()?;
    let height = keeper.height();

    let mut old: Vec<NodeAccount> = keeper
        .list_active_validators()?
        .into_iter()
        .filter(|na| na.version < min_version && height - na.status_since > grace)
        .collect();
    old.sort_by(|a, b| {
        a.status_since
            .cmp(&b.status_since)
            .then_with(|| a.node_address.cmp(&b.node_address))
    });

    for na in old.into_iter().take(max) {
        mark_actor(keeper, na, "low version")?;
    }
    Ok(())
}

/// Status a standby or ready node should be in, with the reason it is not
/// ready.
pub fn node_account_preflight_check(keeper: &Keeper, na: &NodeAccount) -> Result<(NodeStatus, Option<String>)> {
    if na.forced_to_leave {
        return Ok((NodeStatus::Disabled, Some("node account has been forced to leave".into())));
    }
    if na.requested_to_leave {
        return Ok((NodeStatus::Standby, Some("node account has requested to leave".into())));
    }
    if na.ip_address.parse::<IpAddr>().is_err() {
        return Ok((NodeStatus::Standby, Some("node account has invalid registered IP address".into())));
    }
    if na.pub_key_set.is_empty() {
        return Ok((NodeStatus::Whitelisted, Some("node account has not registered their pubkey set".into())));
    }

    let min_bond = keeper.get_config_i64(ConstantName::MinimumBondInRune).max(0) as u64;
    if na.bond < min_bond {
        return Ok((
            NodeStatus::Standby,
            Some(format!("node account does not have minimum bond requirement: {}/{}", na.bond, min_bond)),
        ));
    }

    let min_version = keeper.get_min_join_version()?;
    if na.version < min_version {
        return Ok((
            NodeStatus::Standby,
            Some(format!("node account does not meet min version requirement: {} vs {}", na.version, min_version)),
        ));
    }

    if keeper.get_node_account_jail(&na.node_address)?.is_jailed(keeper.height()) {
        return Ok((NodeStatus::Standby, Some("node account is jailed".into())));
    }
    if keeper.ragnarok_in_progress() {
        return Ok((NodeStatus::Standby, Some("ragnarok is currently in progress: no churning".into())));
    }
    Ok((NodeStatus::Ready, None))
}

/// Re-run the preflight over standby and ready nodes
pub fn mark_ready_actors(keeper: &mut Keeper) -> Result<()> {
    let mut candidates = keeper.list_validators_by_status(NodeStatus::Standby)?;
    candidates.extend(keeper.list_validators_by_status(NodeStatus::Ready)?);

    let height = keeper.height();
    for mut na in candidates {
        let (status, reason) = node_account_preflight_check(keeper, &na)?;
        if status == na.status {
            continue;
        }
        tracing::debug!(
            node = %na.node_address,
            from = %na.status,
            to = %status,
            reason = reason.as_deref().unwrap_or(""),
            "preflight status change"
        );
        na.update_status(status, height);
        keeper.set_node_account(&na)?;
    }
    Ok(())
}
