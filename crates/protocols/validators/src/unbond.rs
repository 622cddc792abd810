//! Unbond handler

use asgard_core::types::constants::BOND_MODULE;
use asgard_core::{
    Address, Asset, BondType, Chain, Coin, Error, Event, MsgUnBond, NodeAccount, NodeStatus,
    Result, Tx, TxOutItem, VaultStatus,
};
use asgard_store::{Keeper, TxOutStore};

use crate::rewards::passive_backfill;
use crate::yggdrasil::request_ygg_return;

/// Validate and apply an unbond.
///
/// A node whose yggdrasil vault still holds funds gets a return request
/// queued and the unbond fails with [`Error::ReturnYgg`]; the request is
/// meant to survive the failure.
pub fn handle_unbond(keeper: &mut Keeper, msg: &MsgUnBond) -> Result<()> {
    let na = validate(keeper, msg)?;
    keeper.with_checkpoint(|k| apply(k, msg, na))
}

fn validate(keeper: &mut Keeper, msg: &MsgUnBond) -> Result<NodeAccount> {
    msg.validate_basic()?;

    let na = keeper
        .get_node_account(&msg.node_address)?
        .ok_or_else(|| Error::unknown_request(format!("fail to get node account({})", msg.node_address)))?;

    if na.is_active() {
        return Err(Error::unknown_request("cannot unbond while node is in active status"));
    }

    let bp = keeper.get_bond_providers(&msg.node_address)?;
    if !bp.has(&msg.bond_address) && na.bond_address != msg.bond_address {
        return Err(Error::Unauthorized {
            message: format!("{} are not authorized to manage {}", msg.bond_address, msg.node_address),
        });
    }

    let jail = keeper.get_node_account_jail(&msg.node_address)?;
    if jail.is_jailed(keeper.height()) {
        return Err(Error::unknown_request(format!(
            "failed to unbond due to jail status: (release height {}) {}",
            jail.release_height, jail.reason
        )));
    }

    if let Some(pk) = na.pub_key() {
        let retiring = keeper.get_asgard_vaults_by_status(VaultStatus::Retiring)?;
        if retiring.iter().any(|v| v.contains(pk)) {
            tracing::info!(node = %na.node_address, "node is still part of a retiring vault");
            return Err(Error::Conflict {
                message: "fail to unbond, still part of the retiring vault".into(),
            });
        }
    }

    if keeper.get_yggdrasil(&na)?.map_or(false, |ygg| ygg.has_funds()) {
        tracing::warn!(node = %na.node_address, "cannot unbond while yggdrasil vault still has funds");
        request_ygg_return(keeper, &na)?;
        return Err(Error::ReturnYgg);
    }
    Ok(na)
}

fn apply(keeper: &mut Keeper, msg: &MsgUnBond, mut na: NodeAccount) -> Result<()> {
    // a bond top-up may ride along with the unbond
    if let Some(coin) = msg.tx_in.coin(&Asset::rune()) {
        na.bond = na.bond.saturating_add(coin.amount);
    }

    match &msg.bond_provider_address {
        Some(provider) if msg.bond_address == na.bond_address => {
            refund_bond(keeper, &msg.tx_in, provider, msg.amount, &mut na)?;
            if *provider != na.bond_address {
                let mut bp = keeper.get_bond_providers(&na.node_address)?;
                if bp.get(provider).map_or(false, |p| p.bond == 0) && bp.remove(provider) {
                    tracing::info!(node = %na.node_address, provider = %provider, "bond provider removed");
                    keeper.set_bond_providers(&bp)?;
                }
            }
        }
        _ => refund_bond(keeper, &msg.tx_in, &msg.bond_address, msg.amount, &mut na)?,
    }
    Ok(())
}

/// Pay `amount` of bond (the whole bond when 0) back to provider `acc`,
/// capped at that provider's share.
pub fn refund_bond(keeper: &mut Keeper, tx: &Tx, acc: &Address, amount: u64, na: &mut NodeAccount) -> Result<()> {
    if na.is_active() {
        tracing::info!(node = %na.node_address, "node still active, cannot refund bond");
        return Ok(());
    }

    let mut amount = if amount == 0 || amount > na.bond { na.bond } else { amount };

    let mut bp = keeper.get_bond_providers(&na.node_address)?;
    passive_backfill(keeper, na, &mut bp);
    bp.adjust(na.bond);

    let provider_bond = bp.get(acc).map_or(0, |p| p.bond);
    if provider_bond > 0 {
        amount = amount.min(provider_bond);
        bp.unbond(amount, acc);

        let item = TxOutItem::new(Chain::Thor, acc.clone(), Coin::new(Asset::rune(), amount), tx.id.clone())
            .with_module(BOND_MODULE);
        match TxOutStore::new().try_add_tx_out_item(keeper, item, 0) {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::FailAddOutboundTx {
                    message: "fail to add outbound tx: no vault available".into(),
                })
            }
            Err(err) => {
                return Err(Error::FailAddOutboundTx {
                    message: format!("fail to add outbound tx: {err}"),
                })
            }
        }
        keeper.emit_event(Event::bond(
            amount,
            BondType::BondReturned,
            tx.id.clone(),
            na.node_address.clone(),
            acc.clone(),
        ));
        na.bond -= amount;
    }

    if na.requested_to_leave {
        // a node that asked to leave does not come back
        na.update_status(NodeStatus::Disabled, keeper.height());
    }
    keeper.set_node_account(na)?;
    keeper.set_bond_providers(&bp)
}
