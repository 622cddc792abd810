//! Typed access to chain state
//!
//! Every record is JSON-encoded into the key-value store under a fixed
//! prefix. Cross references between tables (node ↔ vault ↔ bond provider)
//! are keys, never owned values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use asgard_core::share::has_super_majority;
use asgard_core::types::constants::{ASGARD_MODULE, THORCHAIN_MODULE};
use asgard_core::{
    Address, Asset, BlockHeight, BondProviders, Coin, ConstantName, ConstantValues, Error, Event,
    Jail, MsgSwap, Network, NodeAccount, NodeStatus, ObservedTxVoter, Pool, PubKey, Result, TxId,
    TxOut, TxOutItem, Vault, VaultStatus, Version,
};

use crate::kv::KvStore;

pub mod prefix {
    pub const SWAP_QUEUE: &str = "swap-queue/";
    pub const POOL: &str = "pool/";
    pub const POOL_FEES: &str = "pool-fees/";
    pub const POOL_SLIP: &str = "pool-slip/";
    pub const NODE: &str = "node/";
    pub const VAULT: &str = "vault/";
    pub const JAIL: &str = "jail/";
    pub const BOND_PROVIDERS: &str = "bp/";
    pub const MIMIR: &str = "mimir/";
    pub const NETWORK: &str = "network";
    pub const SLASH_POINTS: &str = "slash/";
    pub const OBSERVED_TX_IN: &str = "observed-txin/";
    pub const TX_OUT: &str = "txout/";
    pub const KEYGEN: &str = "keygen/";
    pub const BALANCE: &str = "balance/";
    pub const SUPPLY: &str = "supply/";
}

/// Swap queue key: `swap-queue/<txid>-<index>`
pub fn swap_queue_key(tx_id: &TxId, index: u32) -> String {
    format!("{}{}-{}", prefix::SWAP_QUEUE, tx_id, index)
}

fn height_key(prefix: &str, height: BlockHeight) -> String {
    // zero padded so heights iterate in numeric order
    format!("{prefix}{height:020}")
}

/// Node sets a keygen was requested for at one height
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenBlock {
    pub height: BlockHeight,
    pub keygens: Vec<Vec<PubKey>>,
}

/// Queued swap with its per-tx queue index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSwap {
    pub msg: MsgSwap,
    pub index: u32,
}

#[derive(Debug)]
pub struct Keeper {
    store: KvStore,
    constants: ConstantValues,
    height: BlockHeight,
}

impl Keeper {
    pub fn new(constants: ConstantValues) -> Self {
        Self {
            store: KvStore::new(),
            constants,
            height: 0,
        }
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn set_height(&mut self, height: BlockHeight) {
        self.height = height;
    }

    pub fn constants(&self) -> &ConstantValues {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> &mut ConstantValues {
        &mut self.constants
    }

    // ------------------------------------------------------------------
    // Raw access and checkpoints
    // ------------------------------------------------------------------

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key) {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set(key, bytes);
        Ok(())
    }

    fn list_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        self.store
            .prefix_iter(prefix)
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(Error::from))
            .collect()
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn checkpoint_depth(&self) -> usize {
        self.store.depth()
    }

    pub fn rollback_to(&mut self, depth: usize) -> Result<()> {
        self.store.rollback_to(depth)
    }

    /// Run `f` in a nested checkpoint: committed on `Ok`, discarded on `Err`
    pub fn with_checkpoint<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.store.checkpoint();
        match f(self) {
            Ok(value) => {
                self.store.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.store.rollback()?;
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn emit_event(&mut self, event: Event) {
        tracing::debug!(event = event.name(), "emit event");
        self.store.emit(event);
    }

    pub fn events(&self) -> &[Event] {
        self.store.events()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.store.drain_events()
    }

    // ------------------------------------------------------------------
    // Mimir
    // ------------------------------------------------------------------

    pub fn get_mimir(&self, key: &str) -> Result<Option<i64>> {
        self.get_json(&format!("{}{}", prefix::MIMIR, key))
    }

    pub fn set_mimir(&mut self, key: &str, value: i64) -> Result<()> {
        self.set_json(format!("{}{}", prefix::MIMIR, key), &value)
    }

    pub fn delete_mimir(&mut self, key: &str) {
        self.store.delete(&format!("{}{}", prefix::MIMIR, key));
    }

    /// Mimir override of a constant, falling back when absent or below `min`
    pub fn get_config_i64_min(&self, name: ConstantName, min: i64) -> i64 {
        match self.get_mimir(name.as_str()) {
            Ok(Some(v)) if v >= min => v,
            Ok(_) => self.constants.get(name),
            Err(err) => {
                tracing::error!(key = %name, error = %err, "fail to read mimir");
                self.constants.get(name)
            }
        }
    }

    /// Mimir override of a constant, falling back when absent or negative
    pub fn get_config_i64(&self, name: ConstantName) -> i64 {
        self.get_config_i64_min(name, 0)
    }

    // ------------------------------------------------------------------
    // Pools
    // ------------------------------------------------------------------

    pub fn get_pool(&self, asset: &Asset) -> Result<Option<Pool>> {
        self.get_json(&format!("{}{}", prefix::POOL, asset))
    }

    pub fn set_pool(&mut self, pool: &Pool) -> Result<()> {
        self.set_json(format!("{}{}", prefix::POOL, pool.asset), pool)
    }

    pub fn get_pools(&self) -> Result<Vec<Pool>> {
        self.list_json(prefix::POOL)
    }

    /// Cumulative liquidity fees (in RUNE) collected by a pool
    pub fn get_liquidity_fees(&self, asset: &Asset) -> Result<u64> {
        Ok(self
            .get_json(&format!("{}{}", prefix::POOL_FEES, asset))?
            .unwrap_or(0))
    }

    pub fn add_to_liquidity_fees(&mut self, asset: &Asset, fee: u64) -> Result<()> {
        let total = self.get_liquidity_fees(asset)?.saturating_add(fee);
        self.set_json(format!("{}{}", prefix::POOL_FEES, asset), &total)
    }

    /// Cumulative swap slip (basis points) seen by a pool
    pub fn get_swap_slip(&self, asset: &Asset) -> Result<u64> {
        Ok(self
            .get_json(&format!("{}{}", prefix::POOL_SLIP, asset))?
            .unwrap_or(0))
    }

    pub fn add_to_swap_slip(&mut self, asset: &Asset, slip: u64) -> Result<()> {
        let total = self.get_swap_slip(asset)?.saturating_add(slip);
        self.set_json(format!("{}{}", prefix::POOL_SLIP, asset), &total)
    }

    // ------------------------------------------------------------------
    // Node accounts
    // ------------------------------------------------------------------

    pub fn get_node_account(&self, addr: &Address) -> Result<Option<NodeAccount>> {
        self.get_json(&format!("{}{}", prefix::NODE, addr))
    }

    pub fn set_node_account(&mut self, na: &NodeAccount) -> Result<()> {
        na.validate()?;
        self.set_json(format!("{}{}", prefix::NODE, na.node_address), na)
    }

    pub fn list_node_accounts(&self) -> Result<Vec<NodeAccount>> {
        self.list_json(prefix::NODE)
    }

    pub fn list_validators_by_status(&self, status: NodeStatus) -> Result<Vec<NodeAccount>> {
        Ok(self
            .list_node_accounts()?
            .into_iter()
            .filter(|na| na.status == status)
            .collect())
    }

    pub fn list_active_validators(&self) -> Result<Vec<NodeAccount>> {
        self.list_validators_by_status(NodeStatus::Active)
    }

    pub fn list_validators_with_bond(&self) -> Result<Vec<NodeAccount>> {
        Ok(self
            .list_node_accounts()?
            .into_iter()
            .filter(|na| na.bond > 0)
            .collect())
    }

    pub fn total_active_validators(&self) -> Result<usize> {
        Ok(self.list_active_validators()?.len())
    }

    pub fn get_node_account_by_pubkey(&self, pk: &PubKey) -> Result<Option<NodeAccount>> {
        Ok(self
            .list_node_accounts()?
            .into_iter()
            .find(|na| na.pub_key() == Some(pk)))
    }

    /// Highest version run by a two-thirds majority of active nodes
    pub fn get_min_join_version(&self) -> Result<Version> {
        let active = self.list_active_validators()?;
        let mut versions: Vec<Version> = active.iter().map(|na| na.version).collect();
        versions.sort();
        versions.dedup();
        let best = versions
            .into_iter()
            .rev()
            .find(|v| {
                let supporting = active.iter().filter(|na| na.version >= *v).count();
                has_super_majority(supporting, active.len())
            })
            .unwrap_or_default();
        Ok(best)
    }

    // ------------------------------------------------------------------
    // Slash points
    // ------------------------------------------------------------------

    pub fn get_node_account_slash_points(&self, addr: &Address) -> Result<i64> {
        Ok(self
            .get_json(&format!("{}{}", prefix::SLASH_POINTS, addr))?
            .unwrap_or(0))
    }

    pub fn set_node_account_slash_points(&mut self, addr: &Address, points: i64) -> Result<()> {
        self.set_json(format!("{}{}", prefix::SLASH_POINTS, addr), &points.max(0))
    }

    pub fn inc_node_account_slash_points(&mut self, addr: &Address, points: i64) -> Result<()> {
        let current = self.get_node_account_slash_points(addr)?;
        self.set_node_account_slash_points(addr, current.saturating_add(points))
    }

    pub fn reset_node_account_slash_points(&mut self, addr: &Address) {
        self.store.delete(&format!("{}{}", prefix::SLASH_POINTS, addr));
    }

    // ------------------------------------------------------------------
    // Jail
    // ------------------------------------------------------------------

    pub fn get_node_account_jail(&self, addr: &Address) -> Result<Jail> {
        Ok(self
            .get_json(&format!("{}{}", prefix::JAIL, addr))?
            .unwrap_or_else(|| Jail {
                node_address: addr.clone(),
                ..Default::default()
            }))
    }

    pub fn set_node_account_jail(&mut self, addr: &Address, release_height: BlockHeight, reason: &str) -> Result<()> {
        let mut jail = self.get_node_account_jail(addr)?;
        // never shorten an existing sentence
        if jail.release_height < release_height {
            jail.release_height = release_height;
            jail.reason = reason.to_string();
        }
        self.set_json(format!("{}{}", prefix::JAIL, addr), &jail)
    }

    // ------------------------------------------------------------------
    // Bond providers
    // ------------------------------------------------------------------

    pub fn get_bond_providers(&self, node: &Address) -> Result<BondProviders> {
        Ok(self
            .get_json(&format!("{}{}", prefix::BOND_PROVIDERS, node))?
            .unwrap_or_else(|| BondProviders::new(node.clone())))
    }

    pub fn set_bond_providers(&mut self, bp: &BondProviders) -> Result<()> {
        self.set_json(format!("{}{}", prefix::BOND_PROVIDERS, bp.node_address), bp)
    }

    // ------------------------------------------------------------------
    // Vaults
    // ------------------------------------------------------------------

    pub fn get_vault(&self, pk: &PubKey) -> Result<Option<Vault>> {
        self.get_json(&format!("{}{}", prefix::VAULT, pk))
    }

    pub fn vault_exists(&self, pk: &PubKey) -> bool {
        self.store.has(&format!("{}{}", prefix::VAULT, pk))
    }

    pub fn set_vault(&mut self, vault: &Vault) -> Result<()> {
        self.set_json(format!("{}{}", prefix::VAULT, vault.pub_key), vault)
    }

    pub fn get_vaults(&self) -> Result<Vec<Vault>> {
        self.list_json(prefix::VAULT)
    }

    pub fn get_asgard_vaults_by_status(&self, status: VaultStatus) -> Result<Vec<Vault>> {
        Ok(self
            .get_vaults()?
            .into_iter()
            .filter(|v| v.is_asgard() && v.status == status)
            .collect())
    }

    /// Yggdrasil vault of a node, if it has one
    pub fn get_yggdrasil(&self, na: &NodeAccount) -> Result<Option<Vault>> {
        match na.pub_key() {
            Some(pk) => Ok(self.get_vault(pk)?.filter(Vault::is_yggdrasil)),
            None => Ok(None),
        }
    }

    /// Vault whose active member bond most exceeds the value it holds
    pub fn get_most_secure(&self, vaults: &[Vault], signing_period: i64) -> Result<Option<Vault>> {
        let mut best: Option<(i128, &Vault)> = None;
        for vault in vaults {
            let mut total_bond: i128 = 0;
            for pk in &vault.membership {
                if let Some(na) = self.get_node_account_by_pubkey(pk)? {
                    if na.is_active() {
                        total_bond += i128::from(na.bond);
                    }
                }
            }
            let mut total_value: i128 = 0;
            for coin in &vault.coins {
                total_value += i128::from(self.rune_value(coin)?);
            }
            let from = (self.height - signing_period).max(1);
            for height in from..=self.height {
                for item in self.get_tx_out(height)?.pending() {
                    if item.vault_pub_key.as_ref() == Some(&vault.pub_key) {
                        total_value += i128::from(self.rune_value(&item.coin)?);
                    }
                }
            }
            let security = total_bond - total_value;
            let better = match best {
                None => true,
                Some((s, v)) => security > s || (security == s && vault.pub_key < v.pub_key),
            };
            if better {
                best = Some((security, vault));
            }
        }
        Ok(best.map(|(_, v)| v.clone()))
    }

    fn rune_value(&self, coin: &Coin) -> Result<u64> {
        if coin.asset.is_rune() {
            return Ok(coin.amount);
        }
        Ok(self
            .get_pool(&coin.asset.layer1_asset())?
            .map_or(0, |p| p.asset_value_in_rune(coin.amount)))
    }

    // ------------------------------------------------------------------
    // Network
    // ------------------------------------------------------------------

    pub fn get_network(&self) -> Result<Network> {
        Ok(self.get_json(prefix::NETWORK)?.unwrap_or_default())
    }

    pub fn set_network(&mut self, network: &Network) -> Result<()> {
        self.set_json(prefix::NETWORK, network)
    }

    pub fn ragnarok_in_progress(&self) -> bool {
        match self.get_network() {
            Ok(network) => network.ragnarok_in_progress(),
            Err(err) => {
                tracing::error!(error = %err, "fail to get network");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Observed inbound voters
    // ------------------------------------------------------------------

    pub fn get_observed_tx_in_voter(&self, tx_id: &TxId) -> Result<Option<ObservedTxVoter>> {
        self.get_json(&format!("{}{}", prefix::OBSERVED_TX_IN, tx_id))
    }

    pub fn set_observed_tx_in_voter(&mut self, voter: &ObservedTxVoter) -> Result<()> {
        self.set_json(format!("{}{}", prefix::OBSERVED_TX_IN, voter.tx_id), voter)
    }

    // ------------------------------------------------------------------
    // Outbound queue
    // ------------------------------------------------------------------

    pub fn get_tx_out(&self, height: BlockHeight) -> Result<TxOut> {
        Ok(self
            .get_json(&height_key(prefix::TX_OUT, height))?
            .unwrap_or_else(|| TxOut::new(height)))
    }

    pub fn set_tx_out(&mut self, tx_out: &TxOut) -> Result<()> {
        self.set_json(height_key(prefix::TX_OUT, tx_out.height), tx_out)
    }

    pub fn append_tx_out(&mut self, height: BlockHeight, item: TxOutItem) -> Result<()> {
        let mut tx_out = self.get_tx_out(height)?;
        tx_out.tx_array.push(item);
        self.set_tx_out(&tx_out)
    }

    // ------------------------------------------------------------------
    // Keygen
    // ------------------------------------------------------------------

    pub fn get_keygen_block(&self, height: BlockHeight) -> Result<KeygenBlock> {
        Ok(self
            .get_json(&height_key(prefix::KEYGEN, height))?
            .unwrap_or_else(|| KeygenBlock {
                height,
                keygens: Vec::new(),
            }))
    }

    pub fn set_keygen_block(&mut self, block: &KeygenBlock) -> Result<()> {
        self.set_json(height_key(prefix::KEYGEN, block.height), block)
    }

    // ------------------------------------------------------------------
    // Swap queue
    // ------------------------------------------------------------------

    pub fn set_swap_queue_item(&mut self, msg: &MsgSwap, index: u32) -> Result<()> {
        self.set_json(swap_queue_key(&msg.tx.id, index), msg)
    }

    pub fn remove_swap_queue_item(&mut self, tx_id: &TxId, index: u32) {
        self.store.delete(&swap_queue_key(tx_id, index));
    }

    /// Queued swaps in key order; entries that fail to decode are skipped
    pub fn get_swap_queue_items(&self) -> Vec<QueuedSwap> {
        let mut items = Vec::new();
        for (key, bytes) in self.store.prefix_iter(prefix::SWAP_QUEUE) {
            let msg: MsgSwap = match serde_json::from_slice(&bytes) {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::error!(key = %key, error = %err, "fail to decode swap queue item");
                    continue;
                }
            };
            let index = match key.rsplit('-').next().map(str::parse::<u32>) {
                Some(Ok(index)) => index,
                _ => {
                    tracing::error!(key = %key, "fail to parse swap queue index");
                    continue;
                }
            };
            items.push(QueuedSwap { msg, index });
        }
        items
    }

    // ------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------

    pub fn module_address(name: &str) -> Address {
        Address::module(name)
    }

    fn balance_key(owner: &Address, asset: &Asset) -> String {
        format!("{}{}/{}", prefix::BALANCE, owner, asset)
    }

    pub fn get_balance(&self, owner: &Address, asset: &Asset) -> Result<u64> {
        Ok(self.get_json(&Self::balance_key(owner, asset))?.unwrap_or(0))
    }

    pub fn get_module_balance(&self, module: &str, asset: &Asset) -> Result<u64> {
        self.get_balance(&Self::module_address(module), asset)
    }

    fn set_balance(&mut self, owner: &Address, asset: &Asset, amount: u64) -> Result<()> {
        let key = Self::balance_key(owner, asset);
        if amount == 0 {
            self.store.delete(&key);
            return Ok(());
        }
        self.set_json(key, &amount)
    }

    fn transfer(&mut self, from: &Address, to: &Address, coins: &[Coin]) -> Result<()> {
        for coin in coins {
            let available = self.get_balance(from, &coin.asset)?;
            if available < coin.amount {
                return Err(Error::internal(format!(
                    "insufficient funds in {from}: need {}, have {available} {}",
                    coin.amount, coin.asset
                )));
            }
            self.set_balance(from, &coin.asset, available - coin.amount)?;
            let received = self.get_balance(to, &coin.asset)?;
            self.set_balance(to, &coin.asset, received.saturating_add(coin.amount))?;
        }
        Ok(())
    }

    /// Amount of `asset` minted and not yet burned
    pub fn get_total_supply(&self, asset: &Asset) -> Result<u64> {
        Ok(self.get_json(&format!("{}{}", prefix::SUPPLY, asset))?.unwrap_or(0))
    }

    fn set_total_supply(&mut self, asset: &Asset, amount: u64) -> Result<()> {
        let key = format!("{}{}", prefix::SUPPLY, asset);
        if amount == 0 {
            self.store.delete(&key);
            return Ok(());
        }
        self.set_json(key, &amount)
    }

    pub fn mint_to_module(&mut self, module: &str, coin: &Coin) -> Result<()> {
        if module != THORCHAIN_MODULE && module != ASGARD_MODULE {
            tracing::warn!(module, "minting into a non mint module");
        }
        let owner = Self::module_address(module);
        let balance = self.get_balance(&owner, &coin.asset)?;
        self.set_balance(&owner, &coin.asset, balance.saturating_add(coin.amount))?;
        let supply = self.get_total_supply(&coin.asset)?;
        self.set_total_supply(&coin.asset, supply.saturating_add(coin.amount))
    }

    pub fn burn_from_module(&mut self, module: &str, coin: &Coin) -> Result<()> {
        let owner = Self::module_address(module);
        let balance = self.get_balance(&owner, &coin.asset)?;
        if balance < coin.amount {
            return Err(Error::internal(format!(
                "cannot burn {coin} from {module}: balance {balance}"
            )));
        }
        self.set_balance(&owner, &coin.asset, balance - coin.amount)?;
        let supply = self.get_total_supply(&coin.asset)?;
        self.set_total_supply(&coin.asset, supply.saturating_sub(coin.amount))
    }

    pub fn send_from_module_to_module(&mut self, from: &str, to: &str, coins: &[Coin]) -> Result<()> {
        self.transfer(&Self::module_address(from), &Self::module_address(to), coins)
    }

    pub fn send_from_module_to_account(&mut self, from: &str, to: &Address, coins: &[Coin]) -> Result<()> {
        self.transfer(&Self::module_address(from), to, coins)
    }

    pub fn send_from_account_to_module(&mut self, from: &Address, to: &str, coins: &[Coin]) -> Result<()> {
        self.transfer(from, &Self::module_address(to), coins)
    }
}
