//! Validator manager
//!
//! Block-driven state machine behind validator churn. `begin_block`
//! decides whether a churn is due and requests the keygen for the next
//! vault set. `end_block` turns vault membership changes into node status
//! changes and voting power updates for the consensus engine.

use std::collections::BTreeSet;

use asgard_core::mimir;
use asgard_core::types::constants::GENESIS_BLOCK_HEIGHT;
use asgard_core::{
    BlockHeight, Chain, ConstantName, Error, Event, NodeAccount, NodeStatus, PubKey, Result,
    VaultStatus,
};
use asgard_store::{Keeper, KeygenBlock};

use crate::actors::{
    find_bad_actors, find_low_bond_actor, find_old_actor, last_churn_height, mark_actor,
    mark_low_version_validators, mark_ready_actors,
};
use crate::churn::{find_count_to_remove, split_next};
use crate::ragnarok::process_ragnarok;
use crate::rewards::distribute_bond_reward;
use crate::yggdrasil::request_ygg_return;

/// Voting power of an active validator
pub const VALIDATOR_POWER: i64 = 100;

/// Voting power change handed to the consensus engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorUpdate {
    pub pub_key: String,
    pub power: i64,
}

/// Node set moves decided from the active vault memberships
#[derive(Debug, Default)]
struct ChangedNodes {
    new: Vec<NodeAccount>,
    removed: Vec<NodeAccount>,
}

#[derive(Debug, Default)]
pub struct ValidatorManager {
    /// Consensus keys the engine currently has in its validator set
    existing_validators: Vec<String>,
}

impl ValidatorManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_block(&mut self, keeper: &mut Keeper, existing_validators: Vec<String>) -> Result<()> {
        self.existing_validators = existing_validators;
        let height = keeper.height();
        if height == GENESIS_BLOCK_HEIGHT {
            return self.setup_validator_nodes(keeper);
        }
        if keeper.ragnarok_in_progress() {
            return Ok(());
        }

        let min_bft = keeper.get_config_i64(ConstantName::MinimumNodesForBFT).max(0) as usize;
        let desired = keeper.get_config_i64(ConstantName::DesiredValidatorSet).max(0) as usize;
        let asgard_size = keeper.get_config_i64(ConstantName::AsgardSize).max(1) as usize;
        let interval = keeper.get_config_i64(ConstantName::ChurnInterval);
        let retry_interval = keeper.get_config_i64(ConstantName::ChurnRetryInterval);

        let active_vaults = keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        let last = last_churn_height(keeper)?;
        let total_active = keeper.total_active_validators()?;
        let expected_vaults = total_active.div_ceil(asgard_size);

        let on_schedule = last + interval == height;
        let overdue = height - last > interval || active_vaults.len() != expected_vaults;
        let retry = overdue
            && (height - last - interval)
                .checked_rem(retry_interval)
                .map_or(false, |r| r == 0);
        if !on_schedule && !retry {
            return Ok(());
        }

        if let Some(chain) = self.halted_chain(keeper, &active_vaults)? {
            tracing::info!(%chain, height, "chain is halted, skip churn");
            return Ok(());
        }

        for vault in keeper.get_asgard_vaults_by_status(VaultStatus::Retiring)? {
            if vault.has_funds() {
                tracing::info!(vault = %vault.pub_key, "retiring vault still has funds, skip churn");
                return Ok(());
            }
        }

        if min_bft + 2 < total_active {
            for na in find_bad_actors(keeper)? {
                mark_actor(keeper, na, "bad actor")?;
            }
            if !retry {
                if let Some(na) = find_old_actor(keeper)? {
                    mark_actor(keeper, na, "old actor")?;
                }
                if total_active >= desired {
                    if let Some(na) = find_low_bond_actor(keeper)? {
                        mark_actor(keeper, na, "low bond")?;
                    }
                }
            }
            mark_low_version_validators(keeper)?;
        }

        let (next, rotate) = self.next_vault_node_accounts(keeper, desired)?;
        if !rotate {
            return Ok(());
        }
        self.trigger_keygen(keeper, next, asgard_size)
    }

    /// First chain of an active vault that governance has halted
    fn halted_chain(&self, keeper: &Keeper, active_vaults: &[asgard_core::Vault]) -> Result<Option<Chain>> {
        let chains: BTreeSet<Chain> = active_vaults
            .iter()
            .flat_map(|v| v.chains.iter().copied())
            .collect();
        let height = keeper.height();
        for chain in chains {
            if let Some(halt) = keeper.get_mimir(&mimir::halt_chain(chain))? {
                if halt > 0 && height >= halt {
                    return Ok(Some(chain));
                }
            }
        }
        Ok(None)
    }

    fn trigger_keygen(&self, keeper: &mut Keeper, next: Vec<NodeAccount>, asgard_size: usize) -> Result<()> {
        let groups = split_next(next, asgard_size);
        if groups.is_empty() {
            return Ok(());
        }
        let height = keeper.height();
        let mut block = keeper.get_keygen_block(height)?;
        for group in groups {
            let members: Vec<PubKey> = group.iter().filter_map(|na| na.pub_key().cloned()).collect();
            tracing::info!(height, members = members.len(), "requesting keygen");
            block.keygens.push(members);
        }
        block.height = height;
        keeper.set_keygen_block(&block)
    }

    /// Candidate set for the next vault and whether it differs from the
    /// current active set.
    pub fn next_vault_node_accounts(&self, keeper: &mut Keeper, target: usize) -> Result<(Vec<NodeAccount>, bool)> {
        mark_ready_actors(keeper)?;

        let mut ready = keeper.list_validators_by_status(NodeStatus::Ready)?;
        ready.sort_by(|a, b| b.bond.cmp(&a.bond).then_with(|| a.node_address.cmp(&b.node_address)));

        let mut active = keeper.list_active_validators()?;
        let height = keeper.height();
        let last_churn = last_churn_height(keeper)?;
        for na in active.iter_mut().filter(|na| na.leave_score > 0) {
            let slash_points = keeper.get_node_account_slash_points(&na.node_address)?;
            na.leave_score = crate::churn::get_score(height, slash_points, last_churn).max(1);
        }
        active.sort_by(|a, b| leave_order(a).cmp(&leave_order(b)).then_with(|| a.node_address.cmp(&b.node_address)));

        let to_remove = find_count_to_remove(&active);
        let mut rotate = to_remove > 0;
        let mut next: Vec<NodeAccount> = active.into_iter().skip(to_remove).collect();

        let min_bft = keeper.get_config_i64(ConstantName::MinimumNodesForBFT).max(0) as usize;
        let new_per_churn = keeper.get_config_i64(ConstantName::NumberOfNewNodesPerChurn);
        let mut limit = to_remove + if new_per_churn <= 0 { 1 } else { new_per_churn as usize };
        if next.len() < min_bft {
            limit = limit.max(min_bft - next.len());
        }

        for (i, na) in ready.into_iter().enumerate() {
            if i == limit || next.len() >= target {
                break;
            }
            next.push(na);
            rotate = true;
        }
        Ok((next, rotate))
    }

    /// Promote the bonded genesis nodes to the active set
    fn setup_validator_nodes(&self, keeper: &mut Keeper) -> Result<()> {
        let desired = keeper.get_config_i64(ConstantName::DesiredValidatorSet).max(0) as usize;
        let height = keeper.height();

        let mut nodes: Vec<NodeAccount> = keeper
            .list_node_accounts()?
            .into_iter()
            .filter(|na| matches!(na.status, NodeStatus::Ready | NodeStatus::Active))
            .collect();
        nodes.sort_by(|a, b| b.bond.cmp(&a.bond).then_with(|| a.node_address.cmp(&b.node_address)));

        for (i, mut na) in nodes.into_iter().enumerate() {
            let status = if i < desired { NodeStatus::Active } else { NodeStatus::Standby };
            na.update_status(status, height);
            keeper.set_node_account(&na)?;
        }
        Ok(())
    }

    pub fn end_block(&mut self, keeper: &mut Keeper) -> Result<Vec<ValidatorUpdate>> {
        if keeper.ragnarok_in_progress() {
            process_ragnarok(keeper)?;
            return Ok(Vec::new());
        }

        let changed = self.get_changed_nodes(keeper)?;
        if self.should_trigger_ragnarok(keeper, &changed)? {
            process_ragnarok(keeper)?;
            return Ok(Vec::new());
        }
        if changed.new.is_empty() && changed.removed.is_empty() {
            return Ok(Vec::new());
        }

        if let Err(err) = distribute_bond_reward(keeper) {
            tracing::error!(error = %err, "fail to distribute bond reward");
        }

        let height = keeper.height();
        let mut updates = Vec::new();
        for na in changed.new {
            let Some(mut na) = keeper.get_node_account(&na.node_address)? else {
                continue;
            };
            keeper.emit_event(Event::UpdateNodeAccountStatus {
                address: na.node_address.clone(),
                former: na.status,
                current: NodeStatus::Active,
            });
            na.update_status(NodeStatus::Active, height);
            na.leave_score = 0;
            na.requested_to_leave = false;
            keeper.reset_node_account_slash_points(&na.node_address);
            keeper.set_node_account(&na)?;
            if !na.validator_cons_pub_key.is_empty() {
                updates.push(ValidatorUpdate {
                    pub_key: na.validator_cons_pub_key.clone(),
                    power: VALIDATOR_POWER,
                });
            }
        }

        for na in changed.removed {
            let Some(mut na) = keeper.get_node_account(&na.node_address)? else {
                continue;
            };
            let status = if na.forced_to_leave { NodeStatus::Disabled } else { NodeStatus::Standby };
            keeper.emit_event(Event::UpdateNodeAccountStatus {
                address: na.node_address.clone(),
                former: na.status,
                current: status,
            });
            na.update_status(status, height);
            na.requested_to_leave = false;
            keeper.set_node_account(&na)?;

            if let Err(err) = request_ygg_return(keeper, &na) {
                tracing::error!(node = %na.node_address, error = %err, "fail to request yggdrasil return");
            }
            if self.existing_validators.contains(&na.validator_cons_pub_key) {
                updates.push(ValidatorUpdate {
                    pub_key: na.validator_cons_pub_key.clone(),
                    power: 0,
                });
            }
        }

        for mut na in keeper.list_validators_by_status(NodeStatus::Ready)? {
            na.update_status(NodeStatus::Standby, height);
            keeper.set_node_account(&na)?;
        }
        Ok(updates)
    }

    fn should_trigger_ragnarok(&self, keeper: &Keeper, changed: &ChangedNodes) -> Result<bool> {
        if !keeper.get_asgard_vaults_by_status(VaultStatus::Retiring)?.is_empty() {
            return Ok(false);
        }
        let min_bft = keeper.get_config_i64(ConstantName::MinimumNodesForBFT).max(0) as usize;
        let active = keeper.total_active_validators()?;
        let after = (active + changed.new.len()).saturating_sub(changed.removed.len());
        if active >= min_bft && after < min_bft {
            tracing::warn!(active, after, "too few nodes left, trigger ragnarok");
            return Ok(true);
        }
        let artificial = keeper.get_config_i64(ConstantName::ArtificialRagnarokBlockHeight);
        Ok(artificial > 0 && keeper.height() >= artificial)
    }

    /// Nodes joining and leaving given the current active vaults
    fn get_changed_nodes(&self, keeper: &Keeper) -> Result<ChangedNodes> {
        let vaults = keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
        if vaults.is_empty() {
            return Err(Error::internal("no active vault"));
        }
        let membership: BTreeSet<&PubKey> = vaults.iter().flat_map(|v| v.membership.iter()).collect();

        let mut changed = ChangedNodes::default();
        for na in keeper.list_active_validators()? {
            let in_vault = na.pub_key().map_or(false, |pk| membership.contains(pk));
            if na.forced_to_leave || (!membership.is_empty() && !in_vault) {
                changed.removed.push(na);
            }
        }
        for pk in membership {
            let Some(na) = keeper.get_node_account_by_pubkey(pk)? else {
                tracing::error!(pub_key = %pk, "vault member has no node account");
                continue;
            };
            if !matches!(na.status, NodeStatus::Active | NodeStatus::Disabled) {
                changed.new.push(na);
            }
        }
        Ok(changed)
    }
}

/// Removal priority: forced, requested, marked by ascending score, unmarked
fn leave_order(na: &NodeAccount) -> (u8, u64) {
    if na.forced_to_leave {
        (0, 0)
    } else if na.requested_to_leave {
        (1, 0)
    } else if na.leave_score > 0 {
        (2, na.leave_score)
    } else {
        (3, 0)
    }
}

/// Height the next churn is due at, ignoring retries
pub fn next_churn_height(keeper: &Keeper) -> Result<BlockHeight> {
    let interval = keeper.get_config_i64(ConstantName::ChurnInterval);
    Ok(last_churn_height(keeper)? + interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgard_core::types::constants::{BOND_MODULE, ONE};
    use asgard_core::{Address, Asset, Coin};
    use asgard_store::testing::{node_address, pubkey, Fixture};
    use proptest::prelude::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("node{i:02}")).collect()
    }

    fn active_network(f: &mut Fixture, n: usize) -> PubKey {
        let names = names(n);
        for name in &names {
            f.add_node(name, NodeStatus::Active, 100 * ONE);
        }
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        f.add_asgard(&refs, &[])
    }

    #[test]
    fn test_setup_validator_nodes() {
        let mut f = Fixture::new();
        f.keeper.constants_mut().set(ConstantName::DesiredValidatorSet, 2);
        f.add_node("node1", NodeStatus::Ready, 300 * ONE);
        f.add_node("node2", NodeStatus::Ready, 100 * ONE);
        f.add_node("node3", NodeStatus::Active, 200 * ONE);
        f.add_node("node4", NodeStatus::Whitelisted, 0);

        ValidatorManager::new().begin_block(&mut f.keeper, Vec::new()).unwrap();

        assert_eq!(f.node("node1").status, NodeStatus::Active);
        assert_eq!(f.node("node3").status, NodeStatus::Active);
        assert_eq!(f.node("node2").status, NodeStatus::Standby);
        assert_eq!(f.node("node4").status, NodeStatus::Whitelisted);
    }

    #[test]
    fn test_churn_promotes_standby() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.add_node("joiner", NodeStatus::Standby, 100 * ONE);
        f.set_height(61);

        ValidatorManager::new().begin_block(&mut f.keeper, Vec::new()).unwrap();

        assert_eq!(f.node("joiner").status, NodeStatus::Ready);
        let keygen = f.keeper.get_keygen_block(61).unwrap();
        assert_eq!(keygen.keygens.len(), 1);
        assert_eq!(keygen.keygens[0].len(), 5);
        assert!(keygen.keygens[0].contains(&pubkey("joiner")));
    }

    #[test]
    fn test_churn_skipped_while_chain_halted() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.add_node("joiner", NodeStatus::Standby, 100 * ONE);
        f.keeper.set_mimir(&mimir::halt_chain(Chain::Btc), 1).unwrap();
        f.set_height(61);

        let mut mgr = ValidatorManager::new();
        mgr.begin_block(&mut f.keeper, Vec::new()).unwrap();
        assert_eq!(f.node("joiner").status, NodeStatus::Standby);
        assert!(f.keeper.get_keygen_block(61).unwrap().keygens.is_empty());

        f.keeper.delete_mimir(&mimir::halt_chain(Chain::Btc));
        mgr.begin_block(&mut f.keeper, Vec::new()).unwrap();
        assert_eq!(f.node("joiner").status, NodeStatus::Ready);
    }

    #[test]
    fn test_churn_off_schedule_is_noop() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.add_node("joiner", NodeStatus::Standby, 100 * ONE);
        f.set_height(40);

        ValidatorManager::new().begin_block(&mut f.keeper, Vec::new()).unwrap();
        assert_eq!(f.node("joiner").status, NodeStatus::Standby);
    }

    #[test]
    fn test_churn_retry() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.add_node("joiner", NodeStatus::Standby, 100 * ONE);
        let mut mgr = ValidatorManager::new();

        // 1 + 60 + 30, a retry slot
        f.set_height(91);
        mgr.begin_block(&mut f.keeper, Vec::new()).unwrap();
        assert_eq!(f.node("joiner").status, NodeStatus::Ready);

        f.set_height(92);
        let before = f.keeper.get_keygen_block(92).unwrap();
        mgr.begin_block(&mut f.keeper, Vec::new()).unwrap();
        assert_eq!(f.keeper.get_keygen_block(92).unwrap(), before);
    }

    #[test]
    fn test_churn_skipped_with_funded_retiring_vault() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.add_asgard_with_status(
            &["node00"],
            &[asgard_core::Coin::new(asgard_core::Asset::rune(), ONE)],
            VaultStatus::Retiring,
        );
        f.add_node("joiner", NodeStatus::Standby, 100 * ONE);
        f.set_height(61);

        ValidatorManager::new().begin_block(&mut f.keeper, Vec::new()).unwrap();
        assert_eq!(f.node("joiner").status, NodeStatus::Standby);
    }

    #[test]
    fn test_next_vault_rotates_out_marked_node() {
        let mut f = Fixture::new();
        active_network(&mut f, 6);
        let mut na = f.node("node03");
        na.leave_score = 5;
        f.keeper.set_node_account(&na).unwrap();
        f.set_height(61);

        let (next, rotate) = ValidatorManager::new()
            .next_vault_node_accounts(&mut f.keeper, 12)
            .unwrap();
        assert!(rotate);
        assert_eq!(next.len(), 5);
        assert!(next.iter().all(|na| na.node_address != node_address("node03")));
    }

    #[test]
    fn test_next_vault_stable_set() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.set_height(61);
        let (next, rotate) = ValidatorManager::new()
            .next_vault_node_accounts(&mut f.keeper, 12)
            .unwrap();
        assert!(!rotate);
        assert_eq!(next.len(), 4);
    }

    #[test]
    fn test_next_vault_honours_target() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.add_node("joiner", NodeStatus::Standby, 100 * ONE);
        f.set_height(61);
        let (next, rotate) = ValidatorManager::new()
            .next_vault_node_accounts(&mut f.keeper, 4)
            .unwrap();
        assert!(!rotate);
        assert_eq!(next.len(), 4);
    }

    /// Complete a keygen: new active vault, old one retiring and empty
    fn rotate_vault(f: &mut Fixture, old: &PubKey, members: &[&str]) {
        let mut vault = f.keeper.get_vault(old).unwrap().unwrap();
        vault.update_status(VaultStatus::Retiring, f.keeper.height());
        f.keeper.set_vault(&vault).unwrap();
        f.add_asgard(members, &[]);
        let mut vault = f.keeper.get_vault(old).unwrap().unwrap();
        vault.update_status(VaultStatus::Inactive, f.keeper.height());
        f.keeper.set_vault(&vault).unwrap();
    }

    #[test]
    fn test_end_block_applies_rotation() {
        let mut f = Fixture::new();
        let old = active_network(&mut f, 4);
        f.add_node("joiner", NodeStatus::Ready, 100 * ONE);
        let mut leaver = f.node("node03");
        leaver.requested_to_leave = true;
        f.keeper.set_node_account(&leaver).unwrap();
        f.set_height(61);
        rotate_vault(&mut f, &old, &["node00", "node01", "node02", "joiner"]);

        let mut mgr = ValidatorManager::new();
        let existing = vec!["cons-node03".to_string()];
        mgr.begin_block(&mut f.keeper, existing).unwrap();
        let updates = mgr.end_block(&mut f.keeper).unwrap();

        assert!(updates.contains(&ValidatorUpdate {
            pub_key: "cons-joiner".into(),
            power: VALIDATOR_POWER,
        }));
        assert!(updates.contains(&ValidatorUpdate {
            pub_key: "cons-node03".into(),
            power: 0,
        }));
        let joiner = f.node("joiner");
        assert_eq!(joiner.status, NodeStatus::Active);
        assert_eq!(joiner.active_block_height, 61);
        let gone = f.node("node03");
        assert_eq!(gone.status, NodeStatus::Standby);
        assert!(!gone.requested_to_leave);
        assert_eq!(
            f.keeper
                .events()
                .iter()
                .filter(|e| e.name() == "update_node_account_status")
                .count(),
            2
        );
    }

    #[test]
    fn test_end_block_rotates_when_rewards_cannot_be_paid() {
        let mut f = Fixture::new();
        let old = active_network(&mut f, 4);
        for name in names(4) {
            let mut bp = f.keeper.get_bond_providers(&node_address(&name)).unwrap();
            bp.node_operator_fee = 5000;
            f.keeper.set_bond_providers(&bp).unwrap();
        }
        f.add_node("joiner", NodeStatus::Ready, 100 * ONE);
        // empty the bond module so no operator fee can be sent
        let held = f.keeper.get_module_balance(BOND_MODULE, &Asset::rune()).unwrap();
        f.keeper
            .send_from_module_to_account(BOND_MODULE, &Address::new("thor1elsewhere"), &[Coin::new(Asset::rune(), held)])
            .unwrap();
        let mut network = f.keeper.get_network().unwrap();
        network.bond_reward_rune = 10 * ONE;
        f.keeper.set_network(&network).unwrap();
        f.set_height(61);
        rotate_vault(&mut f, &old, &["node00", "node01", "node02", "node03", "joiner"]);

        let updates = ValidatorManager::new().end_block(&mut f.keeper).unwrap();

        assert_eq!(updates, vec![ValidatorUpdate {
            pub_key: "cons-joiner".into(),
            power: VALIDATOR_POWER,
        }]);
        assert_eq!(f.node("joiner").status, NodeStatus::Active);
        assert_eq!(f.node("node00").bond, 100 * ONE);
        assert_eq!(f.keeper.get_network().unwrap().bond_reward_rune, 10 * ONE);
    }

    #[test]
    fn test_end_block_without_changes() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.set_height(10);
        let updates = ValidatorManager::new().end_block(&mut f.keeper).unwrap();
        assert!(updates.is_empty());
    }

    #[test]
    fn test_end_block_requires_active_vault() {
        let mut f = Fixture::new();
        f.add_node("node1", NodeStatus::Active, 100 * ONE);
        f.set_height(10);
        assert!(ValidatorManager::new().end_block(&mut f.keeper).is_err());
    }

    #[test]
    fn test_forced_removal_below_bft_triggers_ragnarok() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        let mut na = f.node("node00");
        na.forced_to_leave = true;
        f.keeper.set_node_account(&na).unwrap();
        f.set_height(10);

        let updates = ValidatorManager::new().end_block(&mut f.keeper).unwrap();
        assert!(updates.is_empty());
        assert!(f.keeper.ragnarok_in_progress());
        assert_eq!(f.keeper.get_network().unwrap().ragnarok_block_height, 10);
    }

    #[test]
    fn test_artificial_ragnarok() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        f.keeper.set_mimir(ConstantName::ArtificialRagnarokBlockHeight.as_str(), 10).unwrap();
        f.set_height(10);

        ValidatorManager::new().end_block(&mut f.keeper).unwrap();
        assert!(f.keeper.ragnarok_in_progress());

        // no churn once ragnarok runs
        f.add_node("joiner", NodeStatus::Standby, 100 * ONE);
        f.set_height(61);
        ValidatorManager::new().begin_block(&mut f.keeper, Vec::new()).unwrap();
        assert_eq!(f.node("joiner").status, NodeStatus::Standby);
    }

    #[test]
    fn test_next_churn_height() {
        let mut f = Fixture::new();
        active_network(&mut f, 4);
        assert_eq!(next_churn_height(&f.keeper).unwrap(), 61);
    }

    proptest! {
        #[test]
        fn prop_single_churn_is_bft_safe(
            marks in proptest::collection::vec((any::<bool>(), any::<bool>(), 0u64..4), 4..16),
            ready in 0usize..6,
        ) {
            let mut f = Fixture::new();
            let names = names(marks.len());
            for (name, (forced, requested, score)) in names.iter().zip(marks.iter()) {
                let mut na = f.add_node(name, NodeStatus::Active, 100 * ONE);
                na.forced_to_leave = *forced;
                na.requested_to_leave = *requested;
                na.leave_score = *score;
                f.keeper.set_node_account(&na).unwrap();
            }
            for i in 0..ready {
                f.add_node(&format!("ready{i}"), NodeStatus::Ready, 100 * ONE);
            }
            f.set_height(61);

            let before = f.keeper.list_active_validators().unwrap();
            let (next, _) = ValidatorManager::new()
                .next_vault_node_accounts(&mut f.keeper, 100)
                .unwrap();
            let kept = before
                .iter()
                .filter(|na| next.iter().any(|n| n.node_address == na.node_address))
                .count();
            prop_assert!(before.len() - kept <= before.len() / 3);
        }
    }
}
