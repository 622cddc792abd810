//! Outbound transaction items

use serde::{Deserialize, Serialize};

use crate::types::{Address, BlockHeight, Chain, Coin, PubKey, TxId};

/// Memo prefixes attached to protocol outbounds
pub mod memo {
    use crate::types::{BlockHeight, TxId};

    pub fn out(in_hash: &TxId) -> String {
        format!("OUT:{in_hash}")
    }

    pub fn refund(in_hash: &TxId) -> String {
        format!("REFUND:{in_hash}")
    }

    pub fn yggdrasil_return(height: BlockHeight) -> String {
        format!("YGGDRASIL-:{height}")
    }

    pub fn ragnarok(height: BlockHeight) -> String {
        format!("RAGNAROK:{height}")
    }
}

/// An outbound the network owes to someone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutItem {
    pub chain: Chain,
    pub to_address: Address,
    /// Vault that signs the outbound; selected when left empty
    #[serde(default)]
    pub vault_pub_key: Option<PubKey>,
    pub coin: Coin,
    #[serde(default)]
    pub memo: String,
    /// Inbound the outbound answers, blank for protocol outbounds
    pub in_hash: TxId,
    #[serde(default)]
    pub out_hash: Option<TxId>,
    /// Module funds are taken from on the native chain, `asgard` when empty
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub aggregator: Option<Address>,
    #[serde(default)]
    pub aggregator_target_asset: Option<String>,
    #[serde(default)]
    pub aggregator_target_limit: Option<u64>,
}

impl TxOutItem {
    pub fn new(chain: Chain, to_address: Address, coin: Coin, in_hash: TxId) -> Self {
        Self {
            chain,
            to_address,
            vault_pub_key: None,
            coin,
            memo: String::new(),
            in_hash,
            out_hash: None,
            module_name: None,
            aggregator: None,
            aggregator_target_asset: None,
            aggregator_target_limit: None,
        }
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_module(mut self, module: &str) -> Self {
        self.module_name = Some(module.to_string());
        self
    }
}

/// Outbounds scheduled for one block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub height: BlockHeight,
    pub tx_array: Vec<TxOutItem>,
}

impl TxOut {
    pub fn new(height: BlockHeight) -> Self {
        Self {
            height,
            tx_array: Vec::new(),
        }
    }

    /// Items not yet signed and broadcast
    pub fn pending(&self) -> impl Iterator<Item = &TxOutItem> {
        self.tx_array.iter().filter(|item| item.out_hash.is_none())
    }
}
