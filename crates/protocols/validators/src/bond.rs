//! Bond handler
//!
//! Deposits bond for a node, creating a whitelisted account on first
//! contact. The operator can also whitelist extra bond providers and set
//! the fee it takes from their rewards.

use asgard_core::types::constants::{ASGARD_MODULE, BOND_MODULE};
use asgard_core::{
    Asset, BondType, Chain, Coin, Error, Event, MsgBond, NodeAccount, NodeStatus, PubKeySet,
    Result,
};
use asgard_store::Keeper;

use crate::rewards::passive_backfill;

pub fn handle_bond(keeper: &mut Keeper, msg: &MsgBond) -> Result<()> {
    validate(keeper, msg)?;
    keeper.with_checkpoint(|k| apply(k, msg))
}

fn validate(keeper: &Keeper, msg: &MsgBond) -> Result<()> {
    msg.validate_basic()?;

    if !msg.bond_address.is_chain(Chain::Thor) {
        return Err(Error::unknown_request(format!(
            "bonding address is NOT a THORChain address: {}",
            msg.bond_address
        )));
    }

    let Some(na) = keeper.get_node_account(&msg.node_address)? else {
        // first bond, anyone may create the node
        if msg.bond_provider_address.is_some() {
            return Err(Error::Unauthorized {
                message: "only the node operator can whitelist bond providers".into(),
            });
        }
        return Ok(());
    };

    if na.status == NodeStatus::Ready {
        return Err(Error::unknown_request("cannot add bond while node is ready status"));
    }

    let is_operator = msg.bond_address == na.bond_address;
    let mut bp = keeper.get_bond_providers(&na.node_address)?;
    passive_backfill(keeper, &na, &mut bp);

    if msg.operator_fee.is_some() {
        if !is_operator {
            return Err(Error::unknown_request("only node operator can set fee"));
        }
        if bp.has_provider_bonded(&na.bond_address) {
            return Err(Error::unknown_request("cannot change operator fee while other providers are bonded"));
        }
    }
    if msg.bond_provider_address.is_some() && !is_operator {
        return Err(Error::Unauthorized {
            message: "only the node operator can whitelist bond providers".into(),
        });
    }
    if !is_operator && !bp.has(&msg.bond_address) {
        return Err(Error::unknown_request("bond address is not valid for node account"));
    }
    if na.is_active() && !bp.has(&msg.bond_address) {
        return Err(Error::unknown_request("active node only accepts bond from its providers"));
    }
    Ok(())
}

fn apply(keeper: &mut Keeper, msg: &MsgBond) -> Result<()> {
    let height = keeper.height();
    let mut na = match keeper.get_node_account(&msg.node_address)? {
        Some(na) => na,
        None => {
            tracing::info!(node = %msg.node_address, "new node whitelisted");
            NodeAccount::new(
                msg.node_address.clone(),
                NodeStatus::Whitelisted,
                PubKeySet::default(),
                0,
                msg.bond_address.clone(),
                height,
            )
        }
    };

    let mut bp = keeper.get_bond_providers(&na.node_address)?;
    passive_backfill(keeper, &na, &mut bp);
    bp.adjust(na.bond);

    na.bond = na.bond.saturating_add(msg.bond);

    if msg.bond_address == na.bond_address {
        if let Some(provider) = &msg.bond_provider_address {
            bp.add(provider.clone());
        }
    }
    if bp.has(&msg.bond_address) {
        bp.bond(msg.bond, &msg.bond_address);
    }
    if let Some(fee) = msg.operator_fee {
        bp.node_operator_fee = fee;
    }

    keeper.set_node_account(&na)?;
    keeper.set_bond_providers(&bp)?;

    if msg.bond > 0 {
        keeper.send_from_module_to_module(ASGARD_MODULE, BOND_MODULE, &[Coin::new(Asset::rune(), msg.bond)])?;
    }
    keeper.emit_event(Event::bond(
        msg.bond,
        BondType::BondPaid,
        msg.tx_in.id.clone(),
        msg.tx_in.from_address.clone(),
        msg.tx_in.to_address.clone(),
    ));
    Ok(())
}
