//! Bond rewards
//!
//! Pays the accumulated bond reward pool out to active nodes, weighted by
//! capped bond and by the blocks each node served without slashes.

use asgard_core::share::{get_safe_share, get_uncapped_share};
use asgard_core::types::constants::{BOND_MODULE, MAX_BASIS_POINTS};
use asgard_core::{
    Asset, BondProviders, BondType, Coin, ConstantName, Error, Event, Network, NodeAccount, Result,
    TxId,
};
use asgard_store::Keeper;

use crate::churn::get_hard_bond_cap;

/// Give a node with no provider record its operator as sole provider
pub fn passive_backfill(keeper: &Keeper, na: &NodeAccount, bp: &mut BondProviders) {
    if !bp.providers.is_empty() {
        return;
    }
    bp.node_operator_fee = keeper.get_config_i64(ConstantName::NodeOperatorFee).max(0) as u64;
    bp.add(na.bond_address.clone());
    bp.bond(na.bond, &na.bond_address);
}

/// Split `network.bond_reward_rune` across the active set.
///
/// Each node earns `share(min(bond, cap), total_effective, pool)` scaled by
/// the share of blocks since the last churn it served unslashed. Whatever
/// slashed blocks forfeit stays in the pool.
///
/// Every payout commits on its own together with the reduced pool, so a
/// node that cannot be paid is logged and skipped.
pub fn distribute_bond_reward(keeper: &mut Keeper) -> Result<()> {
    let active = keeper.list_active_validators()?;
    let last_churn = active.iter().map(|na| na.active_block_height).max().unwrap_or(0);
    let bond_cap = get_hard_bond_cap(&active);
    let total_effective: u64 = active.iter().map(|na| na.bond.min(bond_cap)).sum();

    let reward_pool = keeper.get_network()?.bond_reward_rune;
    for na in active {
        let node = na.node_address.clone();
        let paid = keeper.with_checkpoint(|k| {
            let mut network = k.get_network()?;
            pay_node_account_bond_award(k, &mut network, na, last_churn, reward_pool, total_effective, bond_cap)?;
            k.set_network(&network)
        });
        if let Err(err) = paid {
            tracing::error!(node = %node, error = %err, "fail to pay bond reward");
        }
    }
    Ok(())
}

fn pay_node_account_bond_award(
    keeper: &mut Keeper,
    network: &mut Network,
    mut na: NodeAccount,
    last_churn: i64,
    reward_pool: u64,
    total_effective: u64,
    bond_cap: u64,
) -> Result<()> {
    if na.active_block_height == 0 || na.bond == 0 {
        return Ok(());
    }

    let slash_points = keeper.get_node_account_slash_points(&na.node_address)?;
    let total_blocks = (keeper.height() - last_churn).max(0);
    let earned_blocks = (total_blocks - slash_points).max(0);

    let mut reward = get_uncapped_share(na.bond.min(bond_cap), total_effective, reward_pool);
    if total_blocks > 0 {
        reward = get_uncapped_share(earned_blocks as u64, total_blocks as u64, reward);
    }

    let mut bp = keeper.get_bond_providers(&na.node_address)?;
    passive_backfill(keeper, &na, &mut bp);
    bp.adjust(na.bond);
    let operator = na.bond_address.clone();
    let prior_operator_bond = bp
        .get(&operator)
        .map(|p| p.bond)
        .ok_or_else(|| Error::internal(format!("node {} has no operator bond provider", na.node_address)))?;

    na.bond = na.bond.saturating_add(reward);
    network.bond_reward_rune = network.bond_reward_rune.saturating_sub(reward);
    network.total_bond_units = network.total_bond_units.saturating_sub(total_blocks as u64);
    keeper.set_node_account_slash_points(&na.node_address, (slash_points - total_blocks).max(0))?;

    bp.adjust(na.bond);
    let operator_gain = bp.get(&operator).map_or(0, |p| p.bond).saturating_sub(prior_operator_bond);
    let fee = get_safe_share(bp.node_operator_fee, MAX_BASIS_POINTS, reward).min(operator_gain);
    na.bond -= fee;
    bp.unbond(fee, &operator);

    keeper.set_node_account(&na)?;
    keeper.set_bond_providers(&bp)?;
    keeper.emit_event(Event::bond(
        reward,
        BondType::BondReward,
        TxId::blank(),
        asgard_core::Address::module(BOND_MODULE),
        na.bond_address.clone(),
    ));

    if fee > 0 {
        keeper.send_from_module_to_account(BOND_MODULE, &operator, &[Coin::new(Asset::rune(), fee)])?;
        keeper.emit_event(Event::bond(
            fee,
            BondType::BondReturned,
            TxId::blank(),
            na.node_address.clone(),
            operator,
        ));
    }
    tracing::debug!(node = %na.node_address, reward, fee, "paid bond reward");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgard_core::types::constants::ONE;
    use asgard_core::NodeStatus;
    use asgard_store::testing::{bond_address, node_address, Fixture};

    fn seed(f: &mut Fixture, nodes: &[(&str, u64)], operator_fee: u64) {
        for (name, bond) in nodes {
            f.add_node(name, NodeStatus::Active, *bond);
            let mut bp = f.keeper.get_bond_providers(&node_address(name)).unwrap();
            bp.node_operator_fee = operator_fee;
            f.keeper.set_bond_providers(&bp).unwrap();
        }
        let mut network = f.keeper.get_network().unwrap();
        network.bond_reward_rune = ONE;
        f.keeper.set_network(&network).unwrap();
    }

    #[test]
    fn test_weighted_bond_reward() {
        let mut f = Fixture::new();
        seed(&mut f, &[("node4", 4 * ONE), ("node3", 3 * ONE), ("node2", 2 * ONE)], 500);
        f.set_height(11);

        distribute_bond_reward(&mut f.keeper).unwrap();

        let rune = Asset::rune();
        let balance = |f: &Fixture, name: &str| f.keeper.get_balance(&bond_address(name), &rune).unwrap();
        assert_eq!(balance(&f, "node4"), 1_875_000);
        assert_eq!(balance(&f, "node3"), 1_875_000);
        assert_eq!(balance(&f, "node2"), 1_250_000);

        // reward less the fee stays bonded
        assert_eq!(f.node("node4").bond, 4 * ONE + 37_500_000 - 1_875_000);
        assert_eq!(f.node("node2").bond, 2 * ONE + 25_000_000 - 1_250_000);
        assert_eq!(f.keeper.get_network().unwrap().bond_reward_rune, 0);

        let names: Vec<&str> = f.keeper.events().iter().map(Event::name).collect();
        assert_eq!(names.iter().filter(|n| **n == "bond").count(), 6);
    }

    #[test]
    fn test_slashed_blocks_forfeit_reward() {
        let mut f = Fixture::new();
        seed(&mut f, &[("node1", ONE), ("node2", ONE)], 0);
        f.set_height(11);
        f.keeper.set_node_account_slash_points(&node_address("node1"), 5).unwrap();

        distribute_bond_reward(&mut f.keeper).unwrap();

        assert_eq!(f.node("node1").bond, ONE + 25_000_000);
        assert_eq!(f.node("node2").bond, ONE + 50_000_000);
        assert_eq!(f.keeper.get_node_account_slash_points(&node_address("node1")).unwrap(), 0);
        assert_eq!(f.keeper.get_network().unwrap().bond_reward_rune, 25_000_000);
    }

    #[test]
    fn test_unpaid_node_does_not_undo_earlier_payouts() {
        let mut f = Fixture::new();
        seed(&mut f, &[("node1", 4 * ONE), ("node2", 4 * ONE)], 5000);
        let mut network = f.keeper.get_network().unwrap();
        network.bond_reward_rune = 24 * ONE;
        f.keeper.set_network(&network).unwrap();
        f.set_height(11);

        // bond module holds 8 ONE: the first 6 ONE fee clears, the second does not
        distribute_bond_reward(&mut f.keeper).unwrap();

        let rune = Asset::rune();
        assert_eq!(f.node("node1").bond, 4 * ONE + 12 * ONE - 6 * ONE);
        assert_eq!(f.keeper.get_balance(&bond_address("node1"), &rune).unwrap(), 6 * ONE);
        assert_eq!(f.node("node2").bond, 4 * ONE);
        assert_eq!(f.keeper.get_balance(&bond_address("node2"), &rune).unwrap(), 0);
        assert_eq!(f.keeper.get_network().unwrap().bond_reward_rune, 12 * ONE);
        let rewards = f
            .keeper
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Bond { bond_type: BondType::BondReward, .. }))
            .count();
        assert_eq!(rewards, 1);
        assert_eq!(f.keeper.get_node_account_slash_points(&node_address("node2")).unwrap(), 0);
        assert_eq!(f.keeper.checkpoint_depth(), 0);
    }

    #[test]
    fn test_providers_share_reward() {
        let mut f = Fixture::new();
        seed(&mut f, &[("node1", 2 * ONE)], 1000);
        let provider = asgard_core::Address::new("thor1provider");
        let mut bp = f.keeper.get_bond_providers(&node_address("node1")).unwrap();
        bp.add(provider.clone());
        bp.unbond(ONE, &bond_address("node1"));
        bp.bond(ONE, &provider);
        f.keeper.set_bond_providers(&bp).unwrap();
        f.set_height(11);

        distribute_bond_reward(&mut f.keeper).unwrap();

        let bp = f.keeper.get_bond_providers(&node_address("node1")).unwrap();
        let na = f.node("node1");
        assert_eq!(bp.total(), na.bond);
        // the fee on the reward is paid out, the remainder is split evenly
        assert_eq!(f.keeper.get_balance(&bond_address("node1"), &Asset::rune()).unwrap(), 10_000_000);
        assert_eq!(bp.get(&provider).unwrap().bond, ONE + 45_000_000);
    }
}
