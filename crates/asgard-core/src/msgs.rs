//! Transaction messages
//!
//! Field order matches the signing order of the wire encoding.

use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::errors::{Error, Result};
use crate::types::{Address, Tx};

/// Swap intent, queued and executed at the end of the block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSwap {
    pub tx: Tx,
    pub target_asset: Asset,
    pub destination: Address,
    /// Minimum acceptable output, 0 for none
    #[serde(default)]
    pub swap_target: u64,
    pub signer: Address,
    #[serde(default)]
    pub aggregator: Option<Address>,
    #[serde(default)]
    pub aggregator_target_asset: Option<String>,
    #[serde(default)]
    pub aggregator_target_limit: Option<u64>,
}

impl MsgSwap {
    pub fn new(tx: Tx, target_asset: Asset, destination: Address, swap_target: u64, signer: Address) -> Self {
        Self {
            tx,
            target_asset,
            destination,
            swap_target,
            signer,
            aggregator: None,
            aggregator_target_asset: None,
            aggregator_target_limit: None,
        }
    }

    pub fn validate_basic(&self) -> Result<()> {
        self.tx.validate()?;
        if self.tx.coins.len() != 1 {
            return Err(Error::unknown_request("swap only accepts one coin"));
        }
        if self.destination.is_empty() && !self.target_asset.is_rune() {
            return Err(Error::InvalidAddress {
                message: "swap destination cannot be empty".into(),
            });
        }
        if self.signer.is_empty() {
            return Err(Error::InvalidAddress {
                message: "signer cannot be empty".into(),
            });
        }
        Ok(())
    }
}

/// Unbond (or bond-provider removal) request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUnBond {
    pub tx_in: Tx,
    pub node_address: Address,
    pub amount: u64,
    pub bond_address: Address,
    /// Provider to unbond and remove, set by the operator
    #[serde(default)]
    pub bond_provider_address: Option<Address>,
    pub signer: Address,
}

impl MsgUnBond {
    pub fn validate_basic(&self) -> Result<()> {
        if self.node_address.is_empty() {
            return Err(Error::InvalidAddress {
                message: "node address cannot be empty".into(),
            });
        }
        if self.bond_address.is_empty() {
            return Err(Error::InvalidAddress {
                message: "bond address cannot be empty".into(),
            });
        }
        if self.signer.is_empty() {
            return Err(Error::InvalidAddress {
                message: "signer cannot be empty".into(),
            });
        }
        if self.tx_in.id.is_empty() {
            return Err(Error::unknown_request("tx id cannot be empty"));
        }
        if self.amount == 0 && self.bond_provider_address.is_none() {
            return Err(Error::unknown_request("unbond amount cannot be zero"));
        }
        Ok(())
    }
}

/// Bond deposit, or provider whitelisting when `bond_provider_address` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBond {
    pub tx_in: Tx,
    pub node_address: Address,
    pub bond: u64,
    pub bond_address: Address,
    #[serde(default)]
    pub bond_provider_address: Option<Address>,
    /// Operator fee in basis points, applied when present
    #[serde(default)]
    pub operator_fee: Option<u64>,
    pub signer: Address,
}

impl MsgBond {
    pub fn validate_basic(&self) -> Result<()> {
        if self.node_address.is_empty() {
            return Err(Error::InvalidAddress {
                message: "node address cannot be empty".into(),
            });
        }
        if self.bond_address.is_empty() {
            return Err(Error::InvalidAddress {
                message: "bond address cannot be empty".into(),
            });
        }
        if self.signer.is_empty() {
            return Err(Error::InvalidAddress {
                message: "signer cannot be empty".into(),
            });
        }
        if self.tx_in.id.is_empty() {
            return Err(Error::unknown_request("tx id cannot be empty"));
        }
        if let Some(fee) = self.operator_fee {
            if fee > crate::types::constants::MAX_BASIS_POINTS {
                return Err(Error::unknown_request(format!("operator fee {fee} exceeds 10000")));
            }
        }
        Ok(())
    }
}

/// Messages routed by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    Swap(MsgSwap),
    UnBond(MsgUnBond),
    Bond(MsgBond),
}

impl Msg {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Swap(_) => "swap",
            Self::UnBond(_) => "unbond",
            Self::Bond(_) => "bond",
        }
    }
}
