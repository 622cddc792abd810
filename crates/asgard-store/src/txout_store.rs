//! Outbound scheduling
//!
//! Native-chain outbounds settle immediately as module transfers. External
//! outbounds are assigned a signing vault and queued under the current
//! height for the signers to pick up.

use asgard_core::types::constants::{ASGARD_MODULE, RESERVE_MODULE, THORCHAIN_MODULE};
use asgard_core::{
    memo, Address, Asset, Chain, Coin, ConstantName, Error, Event, PubKey, Result, SupplyType, Tx,
    TxId, TxOutItem, VaultStatus,
};

use crate::keeper::Keeper;

#[derive(Debug, Clone, Copy, Default)]
pub struct TxOutStore;

impl TxOutStore {
    pub fn new() -> Self {
        Self
    }

    /// Outbound fee for `item`, denominated in the item's coin
    pub fn outbound_fee(&self, keeper: &Keeper, item: &TxOutItem) -> Result<u64> {
        let fee_rune = if item.chain.is_thorchain() {
            keeper.get_config_i64(ConstantName::NativeTransactionFee)
        } else {
            keeper.get_config_i64(ConstantName::OutboundTransactionFee)
        };
        let fee_rune = u64::try_from(fee_rune).unwrap_or(0);
        if item.coin.asset.is_rune() {
            return Ok(fee_rune);
        }
        let pool = keeper.get_pool(&item.coin.asset.layer1_asset())?;
        Ok(pool.map_or(0, |p| p.rune_value_in_asset(fee_rune)))
    }

    /// Schedule an outbound after deducting its fee.
    ///
    /// Returns `Ok(false)` when no vault can sign the outbound. Fails with
    /// `NotEnoughToPayFee` when the fee eats the whole coin and with
    /// `OutboundRequirements` when the net amount is below `min_out`.
    pub fn try_add_tx_out_item(&self, keeper: &mut Keeper, mut item: TxOutItem, min_out: u64) -> Result<bool> {
        if item.memo.is_empty() {
            item.memo = memo::out(&item.in_hash);
        }

        let fee = if charges_fee(&item.memo) {
            self.outbound_fee(keeper, &item)?
        } else {
            0
        };
        if fee > 0 && item.coin.amount <= fee {
            return Err(Error::NotEnoughToPayFee);
        }
        let net = item.coin.amount - fee;
        if net < min_out {
            return Err(Error::OutboundRequirements { net, min: min_out });
        }
        item.coin.amount = net;

        if item.chain.is_thorchain() {
            self.native_tx_out(keeper, item, fee)?;
            return Ok(true);
        }

        if item.vault_pub_key.is_none() {
            match self.select_vault(keeper, &item)? {
                Some(pk) => item.vault_pub_key = Some(pk),
                None => {
                    tracing::warn!(coin = %item.coin, chain = %item.chain, "no vault can cover outbound");
                    return Ok(false);
                }
            }
        }
        self.add_to_block_out(keeper, item)?;
        Ok(true)
    }

    /// Queue an outbound as-is, with no fee and no vault selection
    pub fn unsafe_add_tx_out_item(&self, keeper: &mut Keeper, item: TxOutItem) -> Result<()> {
        if item.chain.is_thorchain() {
            return self.native_tx_out(keeper, item, 0);
        }
        self.add_to_block_out(keeper, item)
    }

    /// Outbounds queued at the current height
    pub fn get_outbound_items(&self, keeper: &Keeper) -> Result<Vec<TxOutItem>> {
        Ok(keeper.get_tx_out(keeper.height())?.tx_array)
    }

    fn add_to_block_out(&self, keeper: &mut Keeper, item: TxOutItem) -> Result<()> {
        let height = keeper.height();
        if let Some(mut voter) = keeper.get_observed_tx_in_voter(&item.in_hash)? {
            if voter.outbound_height == 0 {
                voter.outbound_height = height;
                keeper.set_observed_tx_in_voter(&voter)?;
            }
        }
        tracing::info!(
            to = %item.to_address,
            coin = %item.coin,
            memo = %item.memo,
            height,
            "outbound scheduled"
        );
        keeper.append_tx_out(height, item)
    }

    /// Active asgard vault with the most spare funds of the outbound's coin
    fn select_vault(&self, keeper: &Keeper, item: &TxOutItem) -> Result<Option<PubKey>> {
        let signing_period = keeper.get_config_i64(ConstantName::SigningTransactionPeriod);
        let height = keeper.height();
        let mut pending: Vec<TxOutItem> = Vec::new();
        for h in (height - signing_period).max(1)..=height {
            pending.extend(keeper.get_tx_out(h)?.pending().cloned());
        }

        let mut best: Option<(u64, PubKey)> = None;
        for vault in keeper.get_asgard_vaults_by_status(VaultStatus::Active)? {
            if !vault.chains.is_empty() && !vault.chains.contains(&item.chain) {
                continue;
            }
            let reserved: u64 = pending
                .iter()
                .filter(|p| p.vault_pub_key.as_ref() == Some(&vault.pub_key) && p.coin.asset == item.coin.asset)
                .map(|p| p.coin.amount)
                .sum();
            let available = vault.get_coin(&item.coin.asset).saturating_sub(reserved);
            if available < item.coin.amount {
                continue;
            }
            let better = match &best {
                None => true,
                Some((amt, pk)) => available > *amt || (available == *amt && vault.pub_key < *pk),
            };
            if better {
                best = Some((available, vault.pub_key.clone()));
            }
        }
        Ok(best.map(|(_, pk)| pk))
    }

    /// Settle a native outbound through module transfers
    fn native_tx_out(&self, keeper: &mut Keeper, item: TxOutItem, fee: u64) -> Result<()> {
        let module = item
            .module_name
            .clone()
            .unwrap_or_else(|| ASGARD_MODULE.to_string());

        if module == THORCHAIN_MODULE {
            keeper.mint_to_module(THORCHAIN_MODULE, &item.coin)?;
            keeper.emit_event(Event::mint_burn(
                SupplyType::Mint,
                item.coin.asset.clone(),
                item.coin.amount,
                "swap",
            ));
        }

        let coins = vec![item.coin.clone()];
        if item.to_address == Address::module(RESERVE_MODULE) {
            keeper.send_from_module_to_module(&module, RESERVE_MODULE, &coins)?;
        } else {
            keeper.send_from_module_to_account(&module, &item.to_address, &coins)?;
        }

        if fee > 0 {
            self.collect_native_fee(keeper, &module, &item.coin.asset, fee)?;
        }

        let tx = Tx {
            id: TxId::blank(),
            chain: Some(Chain::Thor),
            from_address: Address::module(&module),
            to_address: item.to_address.clone(),
            coins,
            gas: vec![Coin::new(Asset::rune(), fee)],
            memo: item.memo.clone(),
        };
        keeper.emit_event(Event::Outbound {
            in_tx_id: item.in_hash.clone(),
            tx,
        });
        Ok(())
    }

    fn collect_native_fee(&self, keeper: &mut Keeper, module: &str, asset: &Asset, fee: u64) -> Result<()> {
        if module == THORCHAIN_MODULE {
            // minted net of fee, nothing to collect
            return Ok(());
        }
        let coin = Coin::new(asset.clone(), fee);
        if asset.is_rune() {
            if module != RESERVE_MODULE {
                keeper.send_from_module_to_module(module, RESERVE_MODULE, std::slice::from_ref(&coin))?;
            }
            return Ok(());
        }
        if asset.is_synth() && module == ASGARD_MODULE {
            keeper.send_from_module_to_module(ASGARD_MODULE, THORCHAIN_MODULE, std::slice::from_ref(&coin))?;
            keeper.burn_from_module(THORCHAIN_MODULE, &coin)?;
            keeper.emit_event(Event::mint_burn(SupplyType::Burn, asset.clone(), fee, "outbound_fee"));
        }
        Ok(())
    }
}

/// Protocol housekeeping outbounds travel free
fn charges_fee(memo: &str) -> bool {
    !(memo.starts_with("YGGDRASIL-") || memo.starts_with("RAGNAROK:"))
}
