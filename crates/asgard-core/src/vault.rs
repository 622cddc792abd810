//! Vault records

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asset::Asset;
use crate::share::safe_sub;
use crate::types::{BlockHeight, Chain, Coin, PubKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultType {
    /// Multi-party vault held by an active node set
    Asgard,
    /// Single-signer vault assigned to one node
    Yggdrasil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultStatus {
    Active,
    Retiring,
    Inactive,
}

impl fmt::Display for VaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Retiring => "retiring",
            Self::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// Height the vault was created at
    pub block_height: BlockHeight,
    pub pub_key: PubKey,
    #[serde(default)]
    pub coins: Vec<Coin>,
    pub vault_type: VaultType,
    pub status: VaultStatus,
    #[serde(default)]
    pub status_since: BlockHeight,
    /// Member node pubkeys (asgard only)
    #[serde(default)]
    pub membership: Vec<PubKey>,
    #[serde(default)]
    pub chains: Vec<Chain>,
}

impl Vault {
    pub fn new(height: BlockHeight, status: VaultStatus, vault_type: VaultType, pub_key: PubKey, chains: Vec<Chain>) -> Self {
        Self {
            block_height: height,
            pub_key,
            coins: Vec::new(),
            vault_type,
            status,
            status_since: height,
            membership: Vec::new(),
            chains,
        }
    }

    pub fn is_asgard(&self) -> bool {
        self.vault_type == VaultType::Asgard
    }

    pub fn is_yggdrasil(&self) -> bool {
        self.vault_type == VaultType::Yggdrasil
    }

    pub fn contains(&self, pk: &PubKey) -> bool {
        self.membership.contains(pk)
    }

    pub fn update_status(&mut self, status: VaultStatus, height: BlockHeight) {
        self.status = status;
        self.status_since = height;
    }

    pub fn has_funds(&self) -> bool {
        self.coins.iter().any(|c| c.amount > 0)
    }

    pub fn has_funds_for_chain(&self, chain: Chain) -> bool {
        self.coins
            .iter()
            .any(|c| c.asset.get_chain() == chain && c.amount > 0)
    }

    pub fn get_coin(&self, asset: &Asset) -> u64 {
        self.coins
            .iter()
            .find(|c| &c.asset == asset)
            .map_or(0, |c| c.amount)
    }

    pub fn add_funds(&mut self, coins: &[Coin]) {
        for coin in coins {
            match self.coins.iter_mut().find(|c| c.asset == coin.asset) {
                Some(existing) => existing.amount = existing.amount.saturating_add(coin.amount),
                None => self.coins.push(coin.clone()),
            }
        }
    }

    pub fn sub_funds(&mut self, coins: &[Coin]) {
        for coin in coins {
            if let Some(existing) = self.coins.iter_mut().find(|c| c.asset == coin.asset) {
                existing.amount = safe_sub(existing.amount, coin.amount);
            }
        }
    }
}
