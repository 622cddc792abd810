//! Swapper
//!
//! Executes one swap intent against the pools: a single hop when either
//! side is RUNE, otherwise two hops routed through RUNE. Pool writes go
//! straight to the keeper; callers run the swap inside a checkpoint so a
//! failed outbound discards them.

use asgard_core::types::constants::{ASGARD_MODULE, RESERVE_MODULE, THORCHAIN_MODULE};
use asgard_core::{
    mimir, Asset, Coin, Error, Event, MsgSwap, Pool, Result, SupplyType, Tx, TxId, TxOutItem,
};
use asgard_store::{Keeper, TxOutStore};

use crate::calculator::{
    calc_asset_emission, calc_liquidity_fee, calc_swap_slip, round_to_decimal, virtual_depth,
};

/// Result of a completed swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Amount of the target asset emitted
    pub emit: u64,
    /// One swap event per hop
    pub events: Vec<Event>,
}

#[derive(Debug, Default)]
pub struct Swapper {
    coins_to_burn: Vec<Coin>,
    txout: TxOutStore,
}

impl Swapper {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_message(&self, tx: &Tx, target: &Asset, msg: &MsgSwap) -> Result<()> {
        tx.validate()?;
        if target.symbol.is_empty() {
            return Err(Error::swap_fail("target is empty"));
        }
        if msg.destination.is_empty() {
            return Err(Error::swap_fail("destination is empty"));
        }
        Ok(())
    }

    /// Swap the single inbound coin of `msg.tx` into `msg.target_asset`.
    ///
    /// `transaction_fee` is the RUNE outbound fee and `synth_mult` the
    /// virtual depth multiplier for synth swaps, in basis points.
    pub fn swap(&mut self, keeper: &mut Keeper, msg: &MsgSwap, transaction_fee: u64, synth_mult: u64) -> Result<SwapOutcome> {
        let mut tx = msg.tx.clone();
        let target = &msg.target_asset;
        let destination = &msg.destination;
        self.validate_message(&tx, target, msg)?;

        let source = tx.coins[0].asset.clone();
        let height = keeper.height();

        if source.is_synth() {
            let burn_height = keeper.get_mimir(mimir::BURN_SYNTHS)?.unwrap_or(0);
            if burn_height > 0 && height > burn_height {
                return Err(Error::swap_fail("burning synthetics has been disabled"));
            }
        }
        if target.is_synth() {
            let mint_height = keeper.get_mimir(mimir::MINT_SYNTHS)?.unwrap_or(0);
            if mint_height > 0 && height > mint_height {
                return Err(Error::swap_fail("minting synthetics has been disabled"));
            }
        }

        if !destination.is_noop() && !destination.is_chain(target.get_chain()) {
            return Err(Error::swap_fail(format!(
                "destination address is not a valid {} address",
                target.get_chain()
            )));
        }
        if source == *target {
            return Err(Error::swap_fail(format!(
                "cannot swap from {source} --> {target}, assets match"
            )));
        }

        let mut events = Vec::new();
        if !source.is_rune() && !target.is_rune() {
            // the price limit applies to the final hop only
            let (rune, mut evt) = self.swap_one(keeper, &tx, &Asset::rune(), 0, transaction_fee, synth_mult)?;
            tx.coins = vec![Coin::new(Asset::rune(), rune)];
            tx.gas = Vec::new();
            if let Event::Swap { out_txs, .. } = &mut evt {
                *out_txs = Some(Tx {
                    id: TxId::blank(),
                    ..tx.clone()
                });
            }
            events.push(evt);
        }

        let (emit, evt) = self.swap_one(keeper, &tx, target, msg.swap_target, transaction_fee, synth_mult)?;
        events.push(evt);

        if msg.swap_target > 0 && emit < msg.swap_target {
            return Err(Error::PriceLimit {
                emit,
                limit: msg.swap_target,
            });
        }
        if target.is_rune() && emit <= transaction_fee {
            return Err(Error::swap_fail(format!(
                "output RUNE ({emit}) is not enough to pay transaction fee"
            )));
        }
        if emit == 0 {
            return Err(Error::swap_fail("zero emit asset"));
        }

        // events are dropped with the checkpoint if anything below fails
        for evt in &events {
            self.record_swap_event(keeper, evt)?;
        }

        if destination.is_noop() {
            if target.get_chain().is_thorchain() && target.is_synth() {
                let coin = Coin::new(target.clone(), emit);
                keeper.mint_to_module(THORCHAIN_MODULE, &coin)?;
                keeper.send_from_module_to_module(THORCHAIN_MODULE, ASGARD_MODULE, std::slice::from_ref(&coin))?;
                keeper.emit_event(Event::mint_burn(SupplyType::Mint, target.clone(), emit, "swap"));
            }
        } else {
            let mut item = TxOutItem::new(
                target.get_chain(),
                destination.clone(),
                Coin::new(target.clone(), emit),
                msg.tx.id.clone(),
            );
            item.aggregator = msg.aggregator.clone();
            item.aggregator_target_asset = msg.aggregator_target_asset.clone();
            item.aggregator_target_limit = msg.aggregator_target_limit;
            if item.chain.is_thorchain() && (target.is_synth() || target.is_derived()) {
                item.module_name = Some(THORCHAIN_MODULE.to_string());
            }

            let added = self
                .txout
                .try_add_tx_out_item(keeper, item, msg.swap_target)
                .map_err(|e| Error::internal(format!("fail to add outbound tx: {e}")))?;
            if !added {
                return Err(Error::FailAddOutboundTx {
                    message: format!("no vault can send {emit} {target}"),
                });
            }
        }

        self.burn_coins(keeper)?;
        Ok(SwapOutcome { emit, events })
    }

    fn record_swap_event(&self, keeper: &mut Keeper, evt: &Event) -> Result<()> {
        let Event::Swap {
            pool,
            swap_slip,
            liquidity_fee_in_rune,
            in_tx,
            out_txs,
            ..
        } = evt
        else {
            return Ok(());
        };

        keeper.emit_event(evt.clone());
        if let Some(out) = out_txs {
            keeper.emit_event(Event::Outbound {
                in_tx_id: in_tx.id.clone(),
                tx: out.clone(),
            });
        }

        if pool.is_derived() {
            let coin = Coin::new(Asset::rune(), *liquidity_fee_in_rune);
            keeper.mint_to_module(THORCHAIN_MODULE, &coin)?;
            keeper.emit_event(Event::mint_burn(
                SupplyType::Mint,
                Asset::rune(),
                coin.amount,
                "derived_swap_fee",
            ));
            keeper.send_from_module_to_module(THORCHAIN_MODULE, RESERVE_MODULE, &[coin])?;
        } else {
            keeper.add_to_liquidity_fees(pool, *liquidity_fee_in_rune)?;
            keeper.add_to_swap_slip(pool, *swap_slip)?;
        }
        tracing::debug!(
            pool = %pool,
            slip = swap_slip,
            liquidity_fee = liquidity_fee_in_rune,
            "swap counters"
        );
        Ok(())
    }

    fn burn_coins(&mut self, keeper: &mut Keeper) -> Result<()> {
        let coins = std::mem::take(&mut self.coins_to_burn);
        if coins.is_empty() {
            return Ok(());
        }
        if let Err(err) = keeper.send_from_module_to_module(ASGARD_MODULE, THORCHAIN_MODULE, &coins) {
            tracing::error!(error = %err, "fail to move coins during swap");
            return Err(err);
        }
        for coin in coins {
            match keeper.burn_from_module(THORCHAIN_MODULE, &coin) {
                Ok(()) => keeper.emit_event(Event::mint_burn(SupplyType::Burn, coin.asset, coin.amount, "swap")),
                Err(err) => tracing::error!(error = %err, coin = %coin, "fail to burn coins during swap"),
            }
        }
        Ok(())
    }

    /// One hop against the pool of the non-RUNE side
    fn swap_one(
        &mut self,
        keeper: &mut Keeper,
        tx: &Tx,
        target: &Asset,
        swap_target: u64,
        transaction_fee: u64,
        synth_mult: u64,
    ) -> Result<(u64, Event)> {
        let source = &tx.coins[0].asset;
        let amount = tx.coins[0].amount;

        tracing::info!(
            from = %tx.from_address,
            coin = %tx.coins[0],
            target = %target,
            fee = transaction_fee,
            "swapping"
        );

        let mut asset = source.clone();
        if source.is_rune() {
            asset = target.clone();
            if amount <= transaction_fee {
                return Err(Error::SwapFailNotEnoughFee {
                    message: format!("{amount} RUNE cannot cover fee {transaction_fee}"),
                });
            }
        }
        if asset.is_synth() {
            asset = asset.layer1_asset();
        }

        let mut pool: Pool = keeper
            .get_pool(&asset)?
            .ok_or_else(|| Error::swap_fail(format!("pool {asset} doesn't exist")))?;
        if pool.asset.is_vault_asset() {
            return Err(Error::internal(format!(
                "dev error: swapping with a vault({asset}) is not allowed"
            )));
        }
        // synths may be redeemed regardless of pool status
        if !source.is_synth() && !pool.is_available() {
            return Err(Error::swap_fail(format!("pool({asset}) is not available")));
        }

        let (mut depth_in, mut depth_out) = if source.is_rune() {
            (pool.balance_rune, pool.balance_asset)
        } else {
            (pool.balance_asset, pool.balance_rune)
        };
        let x = amount;
        let synth_swap = source.is_synth() || target.is_synth();
        if synth_swap {
            depth_in = virtual_depth(depth_in, synth_mult);
            depth_out = virtual_depth(depth_out, synth_mult);
        }

        if x == 0 {
            return Err(Error::InvalidAmount {
                message: "amount is invalid".into(),
            });
        }
        if depth_in == 0 || depth_out == 0 {
            return Err(Error::InvalidBalance {
                message: format!("pool {asset} has an empty side"),
            });
        }

        let liquidity_fee = calc_liquidity_fee(depth_in, x, depth_out);
        let swap_slip = calc_swap_slip(depth_in, x);
        let emit = round_to_decimal(calc_asset_emission(depth_in, x, depth_out), pool.decimals);
        let liquidity_fee_in_rune = if source.is_rune() {
            pool.asset_value_in_rune(liquidity_fee)
        } else {
            liquidity_fee
        };

        if emit >= depth_out {
            return Err(Error::NotEnoughBalance {
                message: format!("emit {emit} exceeds pool depth {depth_out}"),
            });
        }

        tracing::info!(pool = %pool, lp_units = pool.lp_units, synth_units = pool.synth_units, "pre swap");

        if synth_swap {
            if source.is_synth() {
                pool.balance_rune = pool.balance_rune.saturating_sub(emit);
                self.coins_to_burn.extend(tx.coins.iter().cloned());
            } else {
                pool.balance_rune = pool.balance_rune.saturating_add(x);
            }
            // supply as it stands once this hop's mint or burn settles
            let supply = keeper.get_total_supply(&pool.asset.to_synth())?;
            let supply = if source.is_synth() {
                supply.saturating_sub(x)
            } else {
                supply.saturating_add(emit)
            };
            pool.calc_units(supply);
        } else {
            if source.is_rune() {
                pool.balance_rune = depth_in.saturating_add(x);
                pool.balance_asset = depth_out.saturating_sub(emit);
            } else {
                pool.balance_asset = depth_in.saturating_add(x);
                pool.balance_rune = depth_out.saturating_sub(emit);
            }
            if pool.asset.is_derived() {
                self.coins_to_burn.extend(tx.coins.iter().cloned());
            }
        }

        tracing::info!(pool = %pool, emit, "post swap");
        keeper.set_pool(&pool)?;

        let evt = Event::Swap {
            pool: asset,
            swap_target,
            swap_slip,
            liquidity_fee,
            liquidity_fee_in_rune,
            in_tx: tx.clone(),
            emit_asset: Coin::new(target.clone(), emit),
            out_txs: None,
        };
        Ok((emit, evt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgard_core::types::constants::ONE;
    use asgard_core::{Address, Chain, PoolStatus};
    use asgard_store::testing::Fixture;

    const FEE: u64 = 2_000_000;

    fn btc() -> Asset {
        Asset::new(Chain::Btc, "BTC")
    }

    fn eth() -> Asset {
        Asset::new(Chain::Eth, "ETH")
    }

    fn swap_msg(coin: Coin, target: Asset, destination: &str, swap_target: u64) -> MsgSwap {
        let chain = coin.asset.get_chain();
        let tx = Tx {
            id: TxId::new("ab".repeat(32)).unwrap(),
            chain: Some(chain),
            from_address: Address::new(format!("{}sender", chain.address_prefix())),
            to_address: Address::new(format!("{}vault", chain.address_prefix())),
            coins: vec![coin],
            gas: vec![],
            memo: String::new(),
        };
        MsgSwap::new(tx, target, Address::new(destination), swap_target, Address::new("thor1signer"))
    }

    fn two_pools() -> Fixture {
        let mut f = Fixture::new();
        f.add_pool(btc(), 1000 * ONE, 1000 * ONE);
        f.add_pool(eth(), 1000 * ONE, 1000 * ONE);
        f.add_asgard(&["node1"], &[Coin::new(eth(), 10_000 * ONE), Coin::new(btc(), 10_000 * ONE)]);
        f
    }

    #[test]
    fn test_double_swap() {
        let mut f = two_pools();
        let msg = swap_msg(Coin::new(btc(), 100 * ONE), eth(), "0xdestination", 0);

        let outcome = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap();

        assert_eq!(outcome.emit, 7_050_871_160);
        assert_eq!(outcome.events.len(), 2);
        match &outcome.events[0] {
            Event::Swap { emit_asset, out_txs, swap_slip, .. } => {
                assert_eq!(emit_asset.amount, 8_264_462_809);
                assert_eq!(*swap_slip, 909);
                assert_eq!(out_txs.as_ref().unwrap().coins[0].amount, 8_264_462_809);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(f.keeper.get_swap_slip(&btc()).unwrap(), 909);
        assert_eq!(f.keeper.get_swap_slip(&eth()).unwrap(), 763);
        assert_eq!(f.keeper.get_liquidity_fees(&btc()).unwrap(), 826_446_280);

        let a = f.keeper.get_pool(&btc()).unwrap().unwrap();
        assert_eq!((a.balance_rune, a.balance_asset), (91_735_537_191, 110_000_000_000));
        let b = f.keeper.get_pool(&eth()).unwrap().unwrap();
        assert_eq!((b.balance_rune, b.balance_asset), (108_264_462_809, 92_949_128_840));

        let queued = f.keeper.get_tx_out(f.keeper.height()).unwrap().tx_array;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].coin.asset, eth());
        assert!(queued[0].coin.amount < outcome.emit);
    }

    #[test]
    fn test_swap_is_deterministic() {
        let run = || {
            let mut f = two_pools();
            let msg = swap_msg(Coin::new(btc(), 7 * ONE), eth(), "0xdestination", 0);
            let outcome = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap();
            (outcome, f.keeper.get_pools().unwrap(), f.keeper.drain_events())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_price_limit_error_string() {
        let mut f = two_pools();
        let msg = swap_msg(Coin::new(Asset::rune(), 10 * ONE), btc(), "bc1destination", 100 * ONE);
        let err = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap_err();
        assert!(err.to_string().starts_with("emit asset "));
        assert!(err.to_string().contains("less than price limit 10000000000"));
    }

    #[test]
    fn test_rune_output_must_cover_fee() {
        let mut f = two_pools();
        let msg = swap_msg(Coin::new(btc(), 1_000_000), Asset::rune(), "thor1destination", 0);
        let err = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap_err();
        assert!(err.to_string().contains("not enough to pay transaction fee"));
    }

    #[test]
    fn test_rune_input_must_cover_fee() {
        let mut f = two_pools();
        let msg = swap_msg(Coin::new(Asset::rune(), FEE), btc(), "bc1destination", 0);
        let err = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap_err();
        assert_eq!(err.code(), 110);
    }

    #[test]
    fn test_destination_must_match_target_chain() {
        let mut f = two_pools();
        let msg = swap_msg(Coin::new(Asset::rune(), ONE), btc(), "0xnotbitcoin", 0);
        let err = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap_err();
        assert!(err.to_string().contains("not a valid BTC address"));
    }

    #[test]
    fn test_same_asset_rejected() {
        let mut f = two_pools();
        let msg = swap_msg(Coin::new(btc(), ONE), btc(), "bc1destination", 0);
        assert!(Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).is_err());
    }

    #[test]
    fn test_unavailable_pool_rejected() {
        let mut f = two_pools();
        let mut pool = f.keeper.get_pool(&btc()).unwrap().unwrap();
        pool.status = PoolStatus::Staged;
        f.keeper.set_pool(&pool).unwrap();
        let msg = swap_msg(Coin::new(Asset::rune(), ONE), btc(), "bc1destination", 0);
        let err = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap_err();
        assert!(err.to_string().contains("is not available"));
    }

    #[test]
    fn test_noop_synth_mint_goes_to_asgard() {
        let mut f = two_pools();
        let msg = swap_msg(Coin::new(Asset::rune(), 10 * ONE), btc().to_synth(), "noop", 0);

        let outcome = Swapper::new().swap(&mut f.keeper, &msg, FEE, 20_000).unwrap();

        // virtual depth doubles both sides
        assert_eq!(outcome.emit, calc_asset_emission(2000 * ONE, 10 * ONE, 2000 * ONE));
        let pool = f.keeper.get_pool(&btc()).unwrap().unwrap();
        assert_eq!(pool.balance_rune, 1010 * ONE);
        assert_eq!(pool.balance_asset, 1000 * ONE);
        assert_eq!(
            f.keeper.get_module_balance(ASGARD_MODULE, &btc().to_synth()).unwrap(),
            outcome.emit
        );
        assert!(f.keeper.get_tx_out(f.keeper.height()).unwrap().tx_array.is_empty());

        // synth units follow the minted supply
        let expected = u128::from(pool.lp_units) * u128::from(outcome.emit)
            / (2 * u128::from(pool.balance_asset) - u128::from(outcome.emit));
        assert!(pool.synth_units > 0);
        assert_eq!(u128::from(pool.synth_units), expected);
        assert_eq!(f.keeper.get_total_supply(&btc().to_synth()).unwrap(), outcome.emit);
    }

    #[test]
    fn test_synth_redemption_burns_input() {
        let mut f = two_pools();
        f.fund_module(ASGARD_MODULE, Coin::new(btc().to_synth(), ONE));
        let mut pool = f.keeper.get_pool(&btc()).unwrap().unwrap();
        pool.status = PoolStatus::Staged;
        pool.calc_units(ONE);
        assert!(pool.synth_units > 0);
        f.keeper.set_pool(&pool).unwrap();

        let msg = swap_msg(Coin::new(btc().to_synth(), ONE), Asset::rune(), "thor1destination", 0);
        let outcome = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap();

        let pool = f.keeper.get_pool(&btc()).unwrap().unwrap();
        assert_eq!(pool.balance_rune, 1000 * ONE - outcome.emit);
        assert_eq!(pool.balance_asset, 1000 * ONE);
        // the whole supply was redeemed
        assert_eq!(pool.synth_units, 0);
        assert_eq!(f.keeper.get_total_supply(&btc().to_synth()).unwrap(), 0);
        assert_eq!(f.keeper.get_module_balance(ASGARD_MODULE, &btc().to_synth()).unwrap(), 0);
        assert!(f
            .keeper
            .events()
            .iter()
            .any(|e| matches!(e, Event::MintBurn { supply: SupplyType::Burn, reason, .. } if reason == "swap")));
        assert_eq!(
            f.keeper.get_balance(&Address::new("thor1destination"), &Asset::rune()).unwrap(),
            outcome.emit - FEE
        );
    }

    #[test]
    fn test_burn_synths_switch() {
        let mut f = two_pools();
        f.keeper.set_mimir(mimir::BURN_SYNTHS, 1).unwrap();
        f.set_height(2);
        let msg = swap_msg(Coin::new(btc().to_synth(), ONE), Asset::rune(), "thor1destination", 0);
        let err = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap_err();
        assert!(err.to_string().contains("burning synthetics has been disabled"));
    }

    #[test]
    fn test_emit_rounded_to_pool_decimals() {
        let mut f = two_pools();
        let mut pool = f.keeper.get_pool(&eth()).unwrap().unwrap();
        pool.decimals = 6;
        f.keeper.set_pool(&pool).unwrap();
        let msg = swap_msg(Coin::new(Asset::rune(), 3 * ONE), eth(), "0xdestination", 0);
        let outcome = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap();
        assert_eq!(outcome.emit % 100, 0);
    }

    #[test]
    fn test_derived_pool_mints_fee_to_reserve() {
        let mut f = two_pools();
        let derived = btc().to_derived();
        f.add_pool(derived.clone(), 1000 * ONE, 1000 * ONE);
        f.fund_module(ASGARD_MODULE, Coin::new(Asset::rune(), 10 * ONE));

        let msg = swap_msg(Coin::new(Asset::rune(), 10 * ONE), derived.clone(), "thor1destination", 0);
        let outcome = Swapper::new().swap(&mut f.keeper, &msg, FEE, 10_000).unwrap();

        let fee_in_rune = match &outcome.events[0] {
            Event::Swap { liquidity_fee_in_rune, .. } => *liquidity_fee_in_rune,
            other => panic!("unexpected event {other:?}"),
        };
        assert!(fee_in_rune > 0);
        // outbound fee in RUNE is not collected for a minted coin
        assert_eq!(
            f.keeper.get_module_balance(RESERVE_MODULE, &Asset::rune()).unwrap(),
            fee_in_rune
        );
        assert_eq!(f.keeper.get_liquidity_fees(&derived).unwrap(), 0);
        assert!(f.keeper.get_balance(&Address::new("thor1destination"), &derived).unwrap() > 0);
    }
}
