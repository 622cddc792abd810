//! Genesis state
//!
//! JSON document seeding pools, nodes, vaults, governance overrides and
//! module balances before the first block.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use asgard_core::types::constants::THORCHAIN_MODULE;
use asgard_core::{Address, BondProviders, Coin, Network, NodeAccount, Pool, Vault};
use asgard_store::Keeper;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub node_accounts: Vec<NodeAccount>,
    #[serde(default)]
    pub bond_providers: Vec<BondProviders>,
    #[serde(default)]
    pub vaults: Vec<Vault>,
    /// Governance overrides keyed by constant or mimir name
    #[serde(default)]
    pub mimir: BTreeMap<String, i64>,
    #[serde(default)]
    pub network: Option<Network>,
    /// Coins minted straight into modules, e.g. the asgard pool backing
    #[serde(default)]
    pub module_balances: BTreeMap<String, Vec<Coin>>,
    #[serde(default)]
    pub account_balances: BTreeMap<Address, Vec<Coin>>,
}

impl Genesis {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read genesis file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid genesis file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse genesis json")
    }

    /// Write the genesis state into an empty keeper
    pub fn apply(&self, keeper: &mut Keeper) -> Result<()> {
        for pool in &self.pools {
            keeper
                .set_pool(pool)
                .with_context(|| format!("failed to set pool {}", pool.asset))?;
        }
        for na in &self.node_accounts {
            keeper
                .set_node_account(na)
                .with_context(|| format!("failed to set node account {}", na.node_address))?;
        }
        for bp in &self.bond_providers {
            keeper.set_bond_providers(bp).context("failed to set bond providers")?;
        }
        for vault in &self.vaults {
            keeper
                .set_vault(vault)
                .with_context(|| format!("failed to set vault {}", vault.pub_key))?;
        }
        for (key, value) in &self.mimir {
            keeper
                .set_mimir(key, *value)
                .with_context(|| format!("failed to set mimir {key}"))?;
        }
        if let Some(network) = &self.network {
            keeper.set_network(network).context("failed to set network")?;
        }
        for (module, coins) in &self.module_balances {
            for coin in coins {
                keeper.mint_to_module(THORCHAIN_MODULE, coin)?;
                keeper
                    .send_from_module_to_module(THORCHAIN_MODULE, module, std::slice::from_ref(coin))
                    .with_context(|| format!("failed to fund module {module}"))?;
            }
        }
        for (owner, coins) in &self.account_balances {
            for coin in coins {
                keeper.mint_to_module(THORCHAIN_MODULE, coin)?;
                keeper
                    .send_from_module_to_account(THORCHAIN_MODULE, owner, std::slice::from_ref(coin))
                    .with_context(|| format!("failed to fund account {owner}"))?;
            }
        }
        tracing::info!(
            pools = self.pools.len(),
            nodes = self.node_accounts.len(),
            vaults = self.vaults.len(),
            "genesis applied"
        );
        Ok(())
    }
}
