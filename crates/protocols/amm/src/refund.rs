//! Refunds
//!
//! Sends the coins of a failed inbound back to the sender. A coin that
//! cannot be sent back is never left unaccounted for: external coins are
//! donated to their pool, native non-RUNE coins are burned, and RUNE goes
//! to the reserve.

use asgard_core::types::constants::{ASGARD_MODULE, RESERVE_MODULE, THORCHAIN_MODULE};
use asgard_core::{memo, Coin, Event, ObservedTx, Result, SupplyType, TxOutItem};
use asgard_store::{Keeper, TxOutStore};

/// Refund every recognised coin of `tx` to its sender.
///
/// `source_module` names the module holding the coins on the native chain,
/// `asgard` when `None`.
pub fn refund_tx(keeper: &mut Keeper, tx: &ObservedTx, code: u32, reason: &str, source_module: Option<&str>) -> Result<()> {
    let txout = TxOutStore::new();
    let mut reason = reason.to_string();
    let mut refunded: Vec<Coin> = Vec::new();

    for coin in &tx.tx.coins {
        let pool = keeper.get_pool(&coin.asset.layer1_asset())?;
        let has_depth = pool.as_ref().map_or(false, |p| p.balance_rune > 0);
        if !coin.asset.is_native_rune() && !has_depth {
            // no way to take a fee from it
            tracing::debug!(coin = %coin, "skip refund of unrecognised coin");
            continue;
        }

        let mut item = TxOutItem::new(coin.asset.get_chain(), tx.tx.from_address.clone(), coin.clone(), tx.tx.id.clone())
            .with_memo(memo::refund(&tx.tx.id));
        item.vault_pub_key = tx.observed_pub_key.clone();
        if let Some(module) = source_module {
            item = item.with_module(module);
        }

        let failure = match txout.try_add_tx_out_item(keeper, item, 0) {
            Ok(true) => {
                refunded.push(coin.clone());
                continue;
            }
            Ok(false) => "no vault available".to_string(),
            Err(err) => err.to_string(),
        };
        tracing::error!(coin = %coin, error = %failure, "fail to prepare refund outbound");
        reason = format!("{reason}; fail to refund ({coin}): {failure}");

        let module = source_module.unwrap_or(ASGARD_MODULE);
        if !coin.asset.is_native() {
            if let Some(mut pool) = pool {
                pool.balance_asset = pool.balance_asset.saturating_add(coin.amount);
                keeper.set_pool(&pool)?;
                keeper.emit_event(Event::Donate {
                    pool: pool.asset.clone(),
                    in_tx: tx.tx.clone(),
                });
            }
        } else if !coin.asset.is_native_rune() {
            burn_failed_refund(keeper, module, coin);
        } else if module != RESERVE_MODULE {
            match keeper.send_from_module_to_module(module, RESERVE_MODULE, std::slice::from_ref(coin)) {
                Ok(()) => keeper.emit_event(Event::Reserve {
                    contributor: tx.tx.from_address.clone(),
                    amount: coin.amount,
                    in_tx_id: tx.tx.id.clone(),
                }),
                Err(err) => tracing::error!(error = %err, "fail to send RUNE to reserve after failed refund"),
            }
        }
    }

    keeper.emit_event(Event::Refund {
        code,
        reason,
        in_tx: tx.tx.clone(),
        coins: refunded,
    });
    Ok(())
}

fn burn_failed_refund(keeper: &mut Keeper, module: &str, coin: &Coin) {
    if module != THORCHAIN_MODULE {
        if let Err(err) = keeper.send_from_module_to_module(module, THORCHAIN_MODULE, std::slice::from_ref(coin)) {
            tracing::error!(error = %err, "fail to move coin during failed refund burn");
            return;
        }
    }
    match keeper.burn_from_module(THORCHAIN_MODULE, coin) {
        Ok(()) => keeper.emit_event(Event::mint_burn(
            SupplyType::Burn,
            coin.asset.clone(),
            coin.amount,
            "failed_refund",
        )),
        Err(err) => tracing::error!(error = %err, "fail to burn coin during failed refund burn"),
    }
}
