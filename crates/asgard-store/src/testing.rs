//! State fixtures for tests
//!
//! Names passed to the builders are turned into deterministic hex keys and
//! `thor1<name>` addresses, so tests can refer to nodes by name.

use asgard_core::types::constants::THORCHAIN_MODULE;
use asgard_core::{
    Address, Asset, BlockHeight, BondProviders, Chain, Coin, ConstantValues, Environment,
    NodeAccount, NodeStatus, Pool, PubKey, PubKeySet, Vault, VaultStatus, VaultType, Version,
};

use crate::keeper::Keeper;

/// Version every fixture node runs
pub const FIXTURE_VERSION: Version = Version::new(1, 106, 0);

pub fn pubkey(name: &str) -> PubKey {
    PubKey(hex::encode(name.as_bytes()))
}

pub fn node_address(name: &str) -> Address {
    Address::new(format!("thor1{name}"))
}

pub fn bond_address(name: &str) -> Address {
    Address::new(format!("thor1{name}op"))
}

pub struct Fixture {
    pub keeper: Keeper,
    vault_seq: u32,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    /// Mocknet constants at height 1
    pub fn new() -> Self {
        Self::with_constants(ConstantValues::new(Environment::Mocknet))
    }

    pub fn with_constants(constants: ConstantValues) -> Self {
        let mut keeper = Keeper::new(constants);
        keeper.set_height(1);
        Self {
            keeper,
            vault_seq: 0,
        }
    }

    pub fn set_height(&mut self, height: BlockHeight) -> &mut Self {
        self.keeper.set_height(height);
        self
    }

    /// Credit a module with freshly minted coins
    pub fn fund_module(&mut self, module: &str, coin: Coin) {
        self.keeper
            .mint_to_module(THORCHAIN_MODULE, &coin)
            .and_then(|_| {
                self.keeper
                    .send_from_module_to_module(THORCHAIN_MODULE, module, &[coin])
            })
            .expect("fund module");
    }

    pub fn fund_account(&mut self, owner: &Address, coin: Coin) {
        self.keeper
            .mint_to_module(THORCHAIN_MODULE, &coin)
            .and_then(|_| {
                self.keeper
                    .send_from_module_to_account(THORCHAIN_MODULE, owner, &[coin])
            })
            .expect("fund account");
    }

    /// Available pool; its RUNE side is backed by the asgard module
    pub fn add_pool(&mut self, asset: Asset, balance_rune: u64, balance_asset: u64) -> Pool {
        let mut pool = Pool::new(asset, balance_rune, balance_asset);
        pool.lp_units = balance_rune;
        self.keeper.set_pool(&pool).expect("set pool");
        self.fund_module(
            asgard_core::types::constants::ASGARD_MODULE,
            Coin::new(Asset::rune(), balance_rune),
        );
        pool
    }

    /// Node whose operator provides the whole bond, held by the bond module
    pub fn add_node(&mut self, name: &str, status: NodeStatus, bond: u64) -> NodeAccount {
        let pk = pubkey(name);
        let mut na = NodeAccount::new(
            node_address(name),
            status,
            PubKeySet {
                secp256k1: Some(pk.clone()),
                ed25519: Some(pk),
            },
            bond,
            bond_address(name),
            self.keeper.height(),
        );
        na.version = FIXTURE_VERSION;
        na.ip_address = "10.0.0.1".to_string();
        na.validator_cons_pub_key = format!("cons-{name}");
        self.keeper.set_node_account(&na).expect("set node");

        let mut bp = BondProviders::new(na.node_address.clone());
        bp.add(na.bond_address.clone());
        bp.bond(bond, &na.bond_address);
        self.keeper.set_bond_providers(&bp).expect("set bond providers");

        if bond > 0 {
            self.fund_module(
                asgard_core::types::constants::BOND_MODULE,
                Coin::new(Asset::rune(), bond),
            );
        }
        na
    }

    /// Active asgard vault over the named nodes
    pub fn add_asgard(&mut self, members: &[&str], coins: &[Coin]) -> PubKey {
        self.add_asgard_with_status(members, coins, VaultStatus::Active)
    }

    pub fn add_asgard_with_status(&mut self, members: &[&str], coins: &[Coin], status: VaultStatus) -> PubKey {
        self.vault_seq += 1;
        let pk = pubkey(&format!("asgard-{}", self.vault_seq));
        let mut vault = Vault::new(
            self.keeper.height(),
            status,
            VaultType::Asgard,
            pk.clone(),
            vec![Chain::Thor, Chain::Btc, Chain::Eth, Chain::Bnb],
        );
        vault.membership = members.iter().map(|m| pubkey(m)).collect();
        vault.add_funds(coins);
        self.keeper.set_vault(&vault).expect("set vault");
        pk
    }

    /// Yggdrasil vault of a named node
    pub fn add_yggdrasil(&mut self, name: &str, coins: &[Coin]) -> Vault {
        let mut vault = Vault::new(
            self.keeper.height(),
            VaultStatus::Active,
            VaultType::Yggdrasil,
            pubkey(name),
            vec![Chain::Btc, Chain::Eth, Chain::Bnb],
        );
        vault.membership = vec![pubkey(name)];
        vault.add_funds(coins);
        self.keeper.set_vault(&vault).expect("set vault");
        vault
    }

    pub fn node(&self, name: &str) -> NodeAccount {
        self.keeper
            .get_node_account(&node_address(name))
            .expect("get node")
            .expect("node exists")
    }
}
