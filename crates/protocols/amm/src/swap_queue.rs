//! Swap Queue
//!
//! Swap intents are queued during the block and executed at its end. Each
//! item is scored by the liquidity fee and the slip it would produce; the
//! two rankings are summed so an item that ranks high on either metric
//! executes early. Only a bounded batch runs per block and the rest stays
//! queued for the next one.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use asgard_core::types::constants::MAX_BASIS_POINTS;
use asgard_core::{Asset, Coin, ConstantName, Error, MsgSwap, ObservedTx, Pool, Result};
use asgard_store::{Keeper, QueuedSwap};

use crate::calculator::{calc_liquidity_fee, calc_swap_slip, virtual_depth};
use crate::refund::refund_tx;

/// Refund code of a swap that failed during execution
pub const CODE_SWAP_FAIL: u32 = 108;

/// Dispatcher the queue hands each picked swap to
pub type SwapDispatcher<'a> = dyn FnMut(&mut Keeper, &MsgSwap) -> Result<()> + 'a;

/// A queued swap with its scores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapItem {
    pub index: u32,
    pub msg: MsgSwap,
    /// Liquidity fee in RUNE summed over the hops
    pub fee: u64,
    /// Slip in basis points summed over the hops
    pub slip: u64,
}

impl SwapItem {
    fn new(queued: QueuedSwap) -> Self {
        Self {
            index: queued.index,
            msg: queued.msg,
            fee: 0,
            slip: 0,
        }
    }

    fn tie_break(&self, other: &Self) -> Ordering {
        self.msg
            .tx
            .id
            .as_str()
            .cmp(other.msg.tx.id.as_str())
            .then(self.index.cmp(&other.index))
    }
}

/// Order items by combined fee and slip rank, best first.
///
/// Position in the fee-descending list plus position in the
/// slip-descending list gives the rank; equal scores and equal ranks fall
/// back to tx id then queue index.
pub fn sort_items(items: Vec<SwapItem>) -> Vec<SwapItem> {
    let n = items.len();
    let mut by_fee: Vec<usize> = (0..n).collect();
    by_fee.sort_by(|&a, &b| {
        items[b]
            .fee
            .cmp(&items[a].fee)
            .then_with(|| items[a].tie_break(&items[b]))
    });
    let mut by_slip: Vec<usize> = (0..n).collect();
    by_slip.sort_by(|&a, &b| {
        items[b]
            .slip
            .cmp(&items[a].slip)
            .then_with(|| items[a].tie_break(&items[b]))
    });

    let mut rank = vec![0usize; n];
    for (pos, &i) in by_fee.iter().enumerate() {
        rank[i] += pos;
    }
    for (pos, &i) in by_slip.iter().enumerate() {
        rank[i] += pos;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| rank[a].cmp(&rank[b]).then_with(|| items[a].tie_break(&items[b])));

    let mut slots: Vec<Option<SwapItem>> = items.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Batch size: half the queue, all of it when the minimum covers the
/// queue, never more than the maximum.
pub fn get_todo_num(queue_len: i64, min_swaps_per_block: i64, max_swaps_per_block: i64) -> i64 {
    let mut todo = queue_len / 2;
    if min_swaps_per_block >= queue_len {
        todo = queue_len;
    }
    if max_swaps_per_block < todo {
        todo = max_swaps_per_block;
    }
    todo
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SwapQueue;

impl SwapQueue {
    pub fn new() -> Self {
        Self
    }

    /// Every queued swap in key order
    pub fn fetch_queue(&self, keeper: &Keeper) -> Vec<SwapItem> {
        keeper
            .get_swap_queue_items()
            .into_iter()
            .map(SwapItem::new)
            .collect()
    }

    /// Execute this block's batch.
    ///
    /// Failed swaps are refunded; every picked item leaves the queue
    /// whatever the outcome.
    pub fn end_block(&self, keeper: &mut Keeper, dispatch: &mut SwapDispatcher<'_>) -> Result<()> {
        let min_swaps = keeper.get_config_i64(ConstantName::MinSwapsPerBlock);
        let max_swaps = keeper.get_config_i64(ConstantName::MaxSwapsPerBlock);
        let synth_mult = keeper.get_config_i64_min(ConstantName::VirtualMultSynthsBasisPoints, 1) as u64;

        let mut swaps = self.fetch_queue(keeper);
        if let Err(err) = self.score_msgs(keeper, &mut swaps, synth_mult) {
            tracing::error!(error = %err, "fail to score swap items");
        }
        let swaps = sort_items(swaps);

        let todo = get_todo_num(swaps.len() as i64, min_swaps, max_swaps).max(0) as usize;
        tracing::debug!(queued = swaps.len(), todo, "processing swap queue");

        for pick in swaps.into_iter().take(todo) {
            if let Err(err) = dispatch(keeper, &pick.msg) {
                tracing::error!(tx = %pick.msg.tx.id, error = %err, "fail to swap");
                self.refund_failed(keeper, &pick.msg, &err);
            }
            keeper.remove_swap_queue_item(&pick.msg.tx.id, pick.index);
        }
        Ok(())
    }

    fn refund_failed(&self, keeper: &mut Keeper, msg: &MsgSwap, err: &Error) {
        let height = keeper.height();
        let observed_pub_key = match keeper.get_observed_tx_in_voter(&msg.tx.id) {
            Ok(Some(voter)) if !voter.tx.tx.id.is_empty() => voter.tx.observed_pub_key,
            Ok(_) => {
                tracing::error!(tx = %msg.tx.id, "fail to get non-empty observed tx");
                None
            }
            Err(voter_err) => {
                tracing::error!(tx = %msg.tx.id, error = %voter_err, "fail to get observed tx voter");
                None
            }
        };
        let observed = ObservedTx::new(msg.tx.clone(), height, observed_pub_key);
        if let Err(refund_err) = refund_tx(keeper, &observed, CODE_SWAP_FAIL, &err.to_string(), None) {
            tracing::error!(tx = %msg.tx.id, error = %refund_err, "fail to refund swap");
        }
    }

    /// Accumulate the fee and slip each item would produce
    pub fn score_msgs(&self, keeper: &Keeper, items: &mut [SwapItem], synth_mult: u64) -> Result<()> {
        let mut pools: BTreeMap<Asset, Option<Pool>> = BTreeMap::new();
        let mut lookup = |asset: &Asset| -> Result<Option<Pool>> {
            if let Some(pool) = pools.get(asset) {
                return Ok(pool.clone());
            }
            let pool = keeper.get_pool(&asset.layer1_asset())?;
            pools.insert(asset.clone(), pool.clone());
            Ok(pool)
        };

        for item in items.iter_mut() {
            let Some(coin) = item.msg.tx.coins.first().cloned() else {
                continue;
            };
            let source = coin.asset.clone();
            let target = item.msg.target_asset.clone();

            let first = if source.is_rune() { &target } else { &source };
            let Some(pool) = lookup(first)? else {
                continue;
            };
            if pool.is_empty() || pool.balance_rune == 0 || pool.balance_asset == 0 {
                continue;
            }
            // synth redemption is scored even against a paused pool
            if !pool.is_available() && !source.is_synth() {
                continue;
            }
            let mult = if first.is_synth() { synth_mult } else { MAX_BASIS_POINTS };
            add_fee_and_slip(&pool, &coin, item, mult);

            if source.is_rune() || target.is_rune() {
                continue;
            }
            let rune = Coin::new(Asset::rune(), pool.asset_value_in_rune(coin.amount));
            let Some(pool) = lookup(&target)? else {
                continue;
            };
            if pool.is_empty() || !pool.is_available() || pool.balance_rune == 0 || pool.balance_asset == 0 {
                continue;
            }
            let mult = if target.is_synth() { synth_mult } else { MAX_BASIS_POINTS };
            add_fee_and_slip(&pool, &rune, item, mult);
        }
        Ok(())
    }
}

fn add_fee_and_slip(pool: &Pool, source: &Coin, item: &mut SwapItem, mult: u64) {
    let (depth_in, depth_out) = if source.asset.is_rune() {
        (pool.balance_rune, pool.balance_asset)
    } else {
        (pool.balance_asset, pool.balance_rune)
    };
    let depth_in = virtual_depth(depth_in, mult);
    let depth_out = virtual_depth(depth_out, mult);

    let mut fee = calc_liquidity_fee(depth_in, source.amount, depth_out);
    if source.asset.is_rune() {
        fee = pool.asset_value_in_rune(fee);
    }
    item.fee = item.fee.saturating_add(fee);
    item.slip = item.slip.saturating_add(calc_swap_slip(depth_in, source.amount));
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgard_core::types::constants::ONE;
    use asgard_core::{Address, Chain, ObservedTxVoter, PoolStatus, Tx, TxId};
    use asgard_store::testing::Fixture;
    use proptest::prelude::*;

    use crate::handler::handle_swap;

    fn btc() -> Asset {
        Asset::new(Chain::Btc, "BTC")
    }

    fn eth() -> Asset {
        Asset::new(Chain::Eth, "ETH")
    }

    fn tx_id(n: u8) -> TxId {
        TxId::new(format!("{n:02x}").repeat(32)).unwrap()
    }

    fn swap(id: u8, coin: Coin, target: Asset, destination: &str) -> MsgSwap {
        let chain = coin.asset.get_chain();
        let tx = Tx {
            id: tx_id(id),
            chain: Some(chain),
            from_address: Address::new(format!("{}sender{id}", chain.address_prefix())),
            to_address: Address::new(format!("{}vault", chain.address_prefix())),
            coins: vec![coin],
            gas: vec![],
            memo: String::new(),
        };
        MsgSwap::new(tx, target, Address::new(destination), 0, Address::new("thor1signer"))
    }

    fn item(id: u8, index: u32, fee: u64, slip: u64) -> SwapItem {
        SwapItem {
            index,
            msg: swap(id, Coin::new(Asset::rune(), ONE), btc(), "bc1dest"),
            fee,
            slip,
        }
    }

    fn keys(items: &[SwapItem]) -> Vec<(TxId, u32)> {
        items.iter().map(|i| (i.msg.tx.id.clone(), i.index)).collect()
    }

    fn pools() -> Fixture {
        let mut f = Fixture::new();
        f.add_pool(btc(), 1000 * ONE, 1000 * ONE);
        f.add_pool(eth(), 1000 * ONE, 1000 * ONE);
        f.add_asgard(&["node1"], &[Coin::new(btc(), 10_000 * ONE), Coin::new(eth(), 10_000 * ONE)]);
        f
    }

    fn dispatch_swap(keeper: &mut Keeper, msg: &MsgSwap) -> Result<()> {
        handle_swap(keeper, msg).map(|_| ())
    }

    #[test]
    fn test_get_todo_num() {
        assert_eq!(get_todo_num(50, 10, 100), 25);
        assert_eq!(get_todo_num(50, 60, 100), 50);
        assert_eq!(get_todo_num(50, 50, 100), 50);
        assert_eq!(get_todo_num(50, 10, 20), 20);
        assert_eq!(get_todo_num(0, 10, 100), 0);
        assert_eq!(get_todo_num(1, 0, 100), 0);
        assert_eq!(get_todo_num(5, 10, 3), 3);
    }

    #[test]
    fn test_sort_by_combined_rank() {
        // a: best fee, worst slip; b: middle on both; c: best slip, worst fee
        let a = item(1, 0, 300, 10);
        let b = item(2, 0, 200, 20);
        let c = item(3, 0, 100, 30);
        // d: second on both, beats everyone's sum
        let d = item(4, 0, 250, 25);
        let sorted = sort_items(vec![a, b, c, d]);
        assert_eq!(keys(&sorted)[0], (tx_id(4), 0));
        // a and c tie at rank 3 and tx id breaks it; b ranks 4
        assert_eq!(
            keys(&sorted)[1..].to_vec(),
            vec![(tx_id(1), 0), (tx_id(3), 0), (tx_id(2), 0)]
        );
    }

    #[test]
    fn test_sort_ties_break_by_txid_then_index() {
        let sorted = sort_items(vec![item(2, 1, 5, 5), item(2, 0, 5, 5), item(1, 3, 5, 5)]);
        assert_eq!(keys(&sorted), vec![(tx_id(1), 3), (tx_id(2), 0), (tx_id(2), 1)]);
    }

    #[test]
    fn test_score_single_and_double_hop() {
        let f = pools();
        let mut items = vec![
            SwapItem::new(QueuedSwap {
                msg: swap(1, Coin::new(btc(), 100 * ONE), Asset::rune(), "thor1dest"),
                index: 0,
            }),
            SwapItem::new(QueuedSwap {
                msg: swap(2, Coin::new(btc(), 100 * ONE), eth(), "0xdest"),
                index: 0,
            }),
        ];
        SwapQueue::new().score_msgs(&f.keeper, &mut items, 10_000).unwrap();

        assert_eq!((items[0].fee, items[0].slip), (826_446_280, 909));
        // second hop priced from the unswapped pool: 100 RUNE into 1000
        assert_eq!((items[1].fee, items[1].slip), (826_446_280 * 2, 909 * 2));
    }

    #[test]
    fn test_score_skips_unavailable_pool_but_not_synth_redemption() {
        let mut f = pools();
        let mut pool = f.keeper.get_pool(&btc()).unwrap().unwrap();
        pool.status = PoolStatus::Staged;
        f.keeper.set_pool(&pool).unwrap();

        let mut items = vec![
            SwapItem::new(QueuedSwap {
                msg: swap(1, Coin::new(btc(), 100 * ONE), Asset::rune(), "thor1dest"),
                index: 0,
            }),
            SwapItem::new(QueuedSwap {
                msg: swap(2, Coin::new(btc().to_synth(), 100 * ONE), Asset::rune(), "thor1dest"),
                index: 0,
            }),
        ];
        SwapQueue::new().score_msgs(&f.keeper, &mut items, 20_000).unwrap();

        assert_eq!((items[0].fee, items[0].slip), (0, 0));
        // depth doubled to 2000 for the synth
        assert_eq!(items[1].slip, calc_swap_slip(2000 * ONE, 100 * ONE));
        assert!(items[1].fee > 0);
    }

    #[test]
    fn test_end_block_runs_batch_and_removes_items() {
        let mut f = pools();
        for id in 1..=4u8 {
            let msg = swap(id, Coin::new(Asset::rune(), u64::from(id) * ONE), btc(), "bc1dest");
            f.keeper.set_swap_queue_item(&msg, 0).unwrap();
        }
        f.keeper.set_mimir("MinSwapsPerBlock", 0).unwrap();

        let mut calls = Vec::new();
        let mut dispatch = |k: &mut Keeper, m: &MsgSwap| -> Result<()> {
            calls.push(m.tx.id.clone());
            dispatch_swap(k, m)
        };
        SwapQueue::new().end_block(&mut f.keeper, &mut dispatch).unwrap();

        // half the queue, largest swaps first
        assert_eq!(calls, vec![tx_id(4), tx_id(3)]);
        let left: Vec<TxId> = f.keeper.get_swap_queue_items().into_iter().map(|q| q.msg.tx.id).collect();
        assert_eq!(left, vec![tx_id(1), tx_id(2)]);
        assert_eq!(f.keeper.get_tx_out(f.keeper.height()).unwrap().tx_array.len(), 2);
    }

    #[test]
    fn test_end_block_refunds_failed_swap_to_observed_vault() {
        let mut f = pools();
        let vault = f.add_asgard(&["node1"], &[Coin::new(btc(), 10_000 * ONE)]);
        let mut msg = swap(7, Coin::new(btc(), ONE), eth(), "0xdest");
        msg.swap_target = 1000 * ONE;
        f.keeper.set_swap_queue_item(&msg, 0).unwrap();
        f.keeper
            .set_observed_tx_in_voter(&ObservedTxVoter {
                tx_id: msg.tx.id.clone(),
                tx: ObservedTx::new(msg.tx.clone(), 1, Some(vault.clone())),
                outbound_height: 0,
                out_txs: vec![],
            })
            .unwrap();
        let before = f.keeper.get_pool(&btc()).unwrap();

        let mut dispatch = dispatch_swap;
        SwapQueue::new().end_block(&mut f.keeper, &mut dispatch).unwrap();

        assert!(f.keeper.get_swap_queue_items().is_empty());
        assert_eq!(f.keeper.get_pool(&btc()).unwrap(), before);
        let queued = f.keeper.get_tx_out(f.keeper.height()).unwrap().tx_array;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].vault_pub_key, Some(vault));
        assert_eq!(queued[0].to_address, msg.tx.from_address);
        let refund = f.keeper.events().iter().find(|e| e.name() == "refund").cloned();
        match refund {
            Some(asgard_core::Event::Refund { code, reason, .. }) => {
                assert_eq!(code, CODE_SWAP_FAIL);
                assert!(reason.starts_with("emit asset"));
            }
            other => panic!("expected refund event, got {other:?}"),
        }
    }

    #[test]
    fn test_end_block_without_voter_still_refunds() {
        let mut f = pools();
        let msg = swap(9, Coin::new(btc(), ONE), Asset::new(Chain::Bnb, "BNB"), "bnb1dest");
        f.keeper.set_swap_queue_item(&msg, 0).unwrap();

        let mut dispatch = dispatch_swap;
        SwapQueue::new().end_block(&mut f.keeper, &mut dispatch).unwrap();

        assert!(f.keeper.get_swap_queue_items().is_empty());
        assert!(f.keeper.events().iter().any(|e| e.name() == "refund"));
    }

    #[test]
    fn test_queue_drains() {
        let mut f = pools();
        for id in 1..=9u8 {
            let msg = swap(id, Coin::new(Asset::rune(), ONE), btc(), "bc1dest");
            f.keeper.set_swap_queue_item(&msg, 0).unwrap();
        }
        f.keeper.set_mimir("MinSwapsPerBlock", 2).unwrap();
        f.keeper.set_mimir("MaxSwapsPerBlock", 3).unwrap();

        let mut blocks: i64 = 0;
        while !f.keeper.get_swap_queue_items().is_empty() {
            blocks += 1;
            f.set_height(1 + blocks);
            let mut dispatch = dispatch_swap;
            SwapQueue::new().end_block(&mut f.keeper, &mut dispatch).unwrap();
            assert!(blocks <= 8, "queue did not drain");
        }
        // 3, 3, 1 (half of 3), then min covers the last 2
        assert_eq!(blocks, 4);
    }

    proptest! {
        #[test]
        fn prop_sort_ignores_input_order(
            scores in proptest::collection::vec((0u64..5, 0u64..5, 0u8..4, 0u32..3), 1..12),
            seed in any::<u64>(),
        ) {
            let mut items: Vec<SwapItem> = Vec::new();
            for (fee, slip, id, index) in scores {
                if items.iter().any(|i| i.msg.tx.id == tx_id(id) && i.index == index) {
                    continue;
                }
                items.push(item(id, index, fee, slip));
            }
            let mut shuffled = items.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            prop_assert_eq!(keys(&sort_items(items)), keys(&sort_items(shuffled)));
        }
    }
}
