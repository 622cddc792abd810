//! Node accounts, bond providers and jails

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Error, Result};
use crate::share::{get_safe_share, safe_sub};
use crate::types::{constants::MAX_BASIS_POINTS, Address, BlockHeight, PubKey, Version};

/// Node lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Unknown,
    Whitelisted,
    Standby,
    Ready,
    Active,
    Disabled,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Whitelisted => "whitelisted",
            Self::Standby => "standby",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Keys a node registers with the network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeySet {
    pub secp256k1: Option<PubKey>,
    pub ed25519: Option<PubKey>,
}

impl PubKeySet {
    pub fn is_empty(&self) -> bool {
        self.secp256k1.as_ref().map_or(true, PubKey::is_empty)
            || self.ed25519.as_ref().map_or(true, PubKey::is_empty)
    }
}

/// Validator node account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAccount {
    pub node_address: Address,
    pub status: NodeStatus,
    pub pub_key_set: PubKeySet,
    /// Consensus key reported to the BFT engine
    #[serde(default)]
    pub validator_cons_pub_key: String,
    pub bond: u64,
    /// Height the node last became active, 0 when not active
    #[serde(default)]
    pub active_block_height: BlockHeight,
    /// Operator address; always the first bond provider
    pub bond_address: Address,
    #[serde(default)]
    pub status_since: BlockHeight,
    #[serde(default)]
    pub requested_to_leave: bool,
    #[serde(default)]
    pub forced_to_leave: bool,
    /// Non-zero once marked for churn-out; lower leaves first
    #[serde(default)]
    pub leave_score: u64,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub version: Version,
}

impl NodeAccount {
    pub fn new(node_address: Address, status: NodeStatus, pub_key_set: PubKeySet, bond: u64, bond_address: Address, height: BlockHeight) -> Self {
        Self {
            node_address,
            status,
            pub_key_set,
            bond,
            bond_address,
            status_since: height,
            active_block_height: if status == NodeStatus::Active { height } else { 0 },
            ..Default::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// Secp256k1 key, which also keys the node's yggdrasil vault
    pub fn pub_key(&self) -> Option<&PubKey> {
        self.pub_key_set.secp256k1.as_ref()
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_address.is_empty() {
            return Err(Error::InvalidAddress {
                message: "node address is empty".into(),
            });
        }
        if self.bond_address.is_empty() {
            return Err(Error::InvalidAddress {
                message: "bond address is empty".into(),
            });
        }
        if self.status == NodeStatus::Unknown {
            return Err(Error::unknown_request("node status cannot be unknown"));
        }
        Ok(())
    }

    /// Move to a new status, tracking when the move happened
    pub fn update_status(&mut self, status: NodeStatus, height: BlockHeight) {
        if self.status == status {
            return;
        }
        self.status = status;
        self.status_since = height;
        if status == NodeStatus::Active {
            self.active_block_height = height;
        } else {
            self.active_block_height = 0;
        }
    }
}

/// One bond contributor of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProvider {
    pub bond_address: Address,
    pub bond: u64,
}

/// Bond contributors of a node; index 0 is the node operator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondProviders {
    pub node_address: Address,
    /// Operator commission on provider rewards, in basis points
    #[serde(default)]
    pub node_operator_fee: u64,
    pub providers: Vec<BondProvider>,
}

impl BondProviders {
    pub fn new(node_address: Address) -> Self {
        Self {
            node_address,
            node_operator_fee: 0,
            providers: Vec::new(),
        }
    }

    pub fn has(&self, addr: &Address) -> bool {
        self.get(addr).is_some()
    }

    pub fn get(&self, addr: &Address) -> Option<&BondProvider> {
        self.providers.iter().find(|p| &p.bond_address == addr)
    }

    pub fn is_operator(&self, addr: &Address) -> bool {
        self.providers.first().map_or(false, |p| &p.bond_address == addr)
    }

    /// Total of all provider bonds
    pub fn total(&self) -> u64 {
        self.providers.iter().map(|p| p.bond).sum()
    }

    /// Add a provider with no bond; no-op if already present
    pub fn add(&mut self, addr: Address) {
        if !self.has(&addr) {
            self.providers.push(BondProvider {
                bond_address: addr,
                bond: 0,
            });
        }
    }

    pub fn bond(&mut self, amount: u64, addr: &Address) {
        if let Some(p) = self.providers.iter_mut().find(|p| &p.bond_address == addr) {
            p.bond = p.bond.saturating_add(amount);
        }
    }

    pub fn unbond(&mut self, amount: u64, addr: &Address) {
        if let Some(p) = self.providers.iter_mut().find(|p| &p.bond_address == addr) {
            p.bond = safe_sub(p.bond, amount);
        }
    }

    /// Remove a provider whose bond is zero; the operator is never removed
    pub fn remove(&mut self, addr: &Address) -> bool {
        let idx = self
            .providers
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, p)| &p.bond_address == addr && p.bond == 0)
            .map(|(i, _)| i);
        match idx {
            Some(i) => {
                self.providers.remove(i);
                true
            }
            None => false,
        }
    }

    /// True when any provider other than the operator carries bond
    pub fn has_provider_bonded(&self, operator: &Address) -> bool {
        self.providers
            .iter()
            .any(|p| &p.bond_address != operator && p.bond > 0)
    }

    /// Realign provider bonds to the node bond.
    ///
    /// Growth is shared pro rata after the operator fee is carved off the
    /// surplus; the operator absorbs rounding so the provider sum always
    /// equals `node_bond`.
    pub fn adjust(&mut self, node_bond: u64) {
        if self.providers.is_empty() {
            return;
        }
        let total = self.total();
        if total == node_bond {
            return;
        }

        let fee = if total < node_bond {
            get_safe_share(self.node_operator_fee, MAX_BASIS_POINTS, node_bond - total)
        } else {
            0
        };
        let node_bond = safe_sub(node_bond, fee);

        let mut operator = node_bond;
        for provider in self.providers.iter_mut().skip(1) {
            provider.bond = get_safe_share(provider.bond, total, node_bond).min(operator);
            operator -= provider.bond;
        }
        self.providers[0].bond = operator + fee;
    }
}

/// Jail record keeping a node out of churn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jail {
    pub node_address: Address,
    pub release_height: BlockHeight,
    #[serde(default)]
    pub reason: String,
}

impl Jail {
    pub fn is_jailed(&self, height: BlockHeight) -> bool {
        self.release_height > height
    }
}
