//! Events emitted by handlers and managers
//!
//! Every event carries the inbound tx id (blank for protocol actions) so
//! consumers can correlate them.

use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::node::NodeStatus;
use crate::pool::PoolStatus;
use crate::types::{Address, Coin, Tx, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondType {
    BondPaid,
    BondReturned,
    BondReward,
    BondCost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplyType {
    Mint,
    Burn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// One per swap hop
    Swap {
        pool: Asset,
        swap_target: u64,
        swap_slip: u64,
        liquidity_fee: u64,
        liquidity_fee_in_rune: u64,
        in_tx: Tx,
        emit_asset: Coin,
        #[serde(default)]
        out_txs: Option<Tx>,
    },
    Outbound {
        in_tx_id: TxId,
        tx: Tx,
    },
    MintBurn {
        supply: SupplyType,
        denom: Asset,
        amount: u64,
        reason: String,
    },
    Bond {
        amount: u64,
        bond_type: BondType,
        tx_id: TxId,
        from_address: Address,
        to_address: Address,
    },
    Refund {
        code: u32,
        reason: String,
        in_tx: Tx,
        coins: Vec<Coin>,
    },
    Donate {
        pool: Asset,
        in_tx: Tx,
    },
    Reserve {
        contributor: Address,
        amount: u64,
        in_tx_id: TxId,
    },
    PoolChange {
        pool: Asset,
        status: PoolStatus,
    },
    UpdateNodeAccountStatus {
        address: Address,
        former: NodeStatus,
        current: NodeStatus,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Swap { .. } => "swap",
            Self::Outbound { .. } => "outbound",
            Self::MintBurn { supply: SupplyType::Mint, .. } => "mint",
            Self::MintBurn { supply: SupplyType::Burn, .. } => "burn",
            Self::Bond { .. } => "bond",
            Self::Refund { .. } => "refund",
            Self::Donate { .. } => "donate",
            Self::Reserve { .. } => "reserve",
            Self::PoolChange { .. } => "pool",
            Self::UpdateNodeAccountStatus { .. } => "update_node_account_status",
        }
    }

    /// Bond event for a protocol-originated movement
    pub fn bond(amount: u64, bond_type: BondType, tx_id: TxId, from_address: Address, to_address: Address) -> Self {
        Self::Bond {
            amount,
            bond_type,
            tx_id,
            from_address,
            to_address,
        }
    }

    pub fn mint_burn(supply: SupplyType, denom: Asset, amount: u64, reason: impl Into<String>) -> Self {
        Self::MintBurn {
            supply,
            denom,
            amount,
            reason: reason.into(),
        }
    }
}
