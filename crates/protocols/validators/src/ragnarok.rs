//! Ragnarok
//!
//! One-way network shutdown. The first tick latches the start height,
//! recalls yggdrasil funds and pays out outstanding rewards. Every later
//! tick waits for the previous round of outbounds to drain, then returns
//! a growing slice of each bond and stages every pool.

use asgard_core::types::constants::BOND_MODULE;
use asgard_core::{
    memo, share::mul_div, Asset, BondType, Chain, Coin, ConstantName, Error, Event, PoolStatus,
    Result, TxId, TxOutItem,
};
use asgard_store::{Keeper, TxOutStore};

use crate::rewards::{distribute_bond_reward, passive_backfill};
use crate::yggdrasil::recall_ygg_funds;

/// Ticks to wait before bonds start coming back
const BOND_RETURN_DELAY: i64 = 10;

pub fn process_ragnarok(keeper: &mut Keeper) -> Result<()> {
    let height = keeper.height();
    let mut network = keeper.get_network()?;

    if network.ragnarok_block_height == 0 {
        tracing::warn!(height, "ragnarok started");
        network.ragnarok_block_height = height;
        keeper.set_network(&network)?;
        recall_ygg_funds(keeper)?;
        return distribute_bond_reward(keeper);
    }

    if network.ragnarok_pending > 0 {
        let pending = pending_ragnarok_items(keeper)?;
        if pending > 0 {
            tracing::info!(pending, "waiting for ragnarok outbounds to be signed");
            return Ok(());
        }
        network.ragnarok_pending = 0;
    }

    network.ragnarok_nth += 1;
    let nth = network.ragnarok_nth;
    keeper.set_network(&network)?;
    tracing::info!(nth, height, "ragnarok round");

    // a failed bond stage is discarded whole; pools unwind regardless
    if let Err(err) = keeper.with_checkpoint(|k| ragnarok_bond(k, nth)) {
        tracing::error!(nth, error = %err, "fail to return bonds during ragnarok");
    }
    ragnarok_pools(keeper)
}

/// Unsigned ragnarok outbounds still inside the signing window
fn pending_ragnarok_items(keeper: &Keeper) -> Result<usize> {
    let height = keeper.height();
    let signing_period = keeper.get_config_i64(ConstantName::SigningTransactionPeriod);
    let mut pending = 0;
    for h in (height - signing_period).max(1)..=height {
        pending += keeper
            .get_tx_out(h)?
            .pending()
            .filter(|item| item.memo.starts_with("RAGNAROK:"))
            .count();
    }
    Ok(pending)
}

/// Return `min(nth - 10, 10)` tenths of every remaining bond to its
/// operator.
pub fn ragnarok_bond(keeper: &mut Keeper, nth: i64) -> Result<()> {
    let n = nth - BOND_RETURN_DELAY;
    if n < 1 {
        return Ok(());
    }
    let n = n.min(10) as u64;

    let txout = TxOutStore::new();
    let height = keeper.height();
    for mut na in keeper.list_validators_with_bond()? {
        if keeper.get_yggdrasil(&na)?.map_or(false, |ygg| ygg.has_funds()) {
            tracing::info!(node = %na.node_address, "skip bond return, yggdrasil still holds funds");
            continue;
        }

        let amount = mul_div(na.bond, n, 10);
        if amount == 0 {
            continue;
        }
        let item = TxOutItem::new(
            Chain::Thor,
            na.bond_address.clone(),
            Coin::new(Asset::rune(), amount),
            TxId::blank(),
        )
        .with_memo(memo::ragnarok(height))
        .with_module(BOND_MODULE);

        match txout.try_add_tx_out_item(keeper, item, 0) {
            Ok(true) | Err(Error::NotEnoughToPayFee) => {}
            Ok(false) => {
                tracing::error!(node = %na.node_address, "fail to schedule ragnarok bond return");
                continue;
            }
            Err(err) => return Err(err),
        }

        let mut network = keeper.get_network()?;
        network.ragnarok_pending += 1;
        keeper.set_network(&network)?;

        let mut bp = keeper.get_bond_providers(&na.node_address)?;
        passive_backfill(keeper, &na, &mut bp);
        na.bond -= amount;
        bp.adjust(na.bond);
        keeper.set_node_account(&na)?;
        keeper.set_bond_providers(&bp)?;
        keeper.emit_event(Event::bond(
            amount,
            BondType::BondCost,
            TxId::blank(),
            na.node_address.clone(),
            na.bond_address.clone(),
        ));
    }
    Ok(())
}

/// Stage every pool so no more swaps or deposits land
pub fn ragnarok_pools(keeper: &mut Keeper) -> Result<()> {
    let mut network = keeper.get_network()?;
    if network.ragnarok_pools_staged {
        return Ok(());
    }
    let height = keeper.height();
    for mut pool in keeper.get_pools()? {
        if pool.status == PoolStatus::Staged {
            continue;
        }
        pool.status = PoolStatus::Staged;
        pool.status_since = height;
        keeper.set_pool(&pool)?;
        keeper.emit_event(Event::PoolChange {
            pool: pool.asset.clone(),
            status: PoolStatus::Staged,
        });
    }
    network.ragnarok_pools_staged = true;
    keeper.set_network(&network)
}
