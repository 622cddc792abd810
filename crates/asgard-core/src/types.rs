//! Core type definitions for Asgard

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::asset::Asset;
use crate::errors::{Error, Result};

/// Block height
pub type BlockHeight = i64;

/// Constants
pub mod constants {
    /// 1 RUNE in base units
    pub const ONE: u64 = 100_000_000;

    /// Basis points denominator
    pub const MAX_BASIS_POINTS: u64 = 10_000;

    /// Module holding federated pool funds
    pub const ASGARD_MODULE: &str = "asgard";

    /// Module holding node bonds
    pub const BOND_MODULE: &str = "bond";

    /// Module holding the protocol reserve
    pub const RESERVE_MODULE: &str = "reserve";

    /// Mint/burn module
    pub const THORCHAIN_MODULE: &str = "thorchain";

    /// Destination sentinel meaning "keep the output on chain"
    pub const NOOP_ADDRESS: &str = "noop";

    /// Height the chain starts at
    pub const GENESIS_BLOCK_HEIGHT: i64 = 1;
}

/// Supported chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Thor,
    Btc,
    Eth,
    Bnb,
    Ltc,
    Bch,
    Doge,
    Gaia,
    Avax,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thor => "THOR",
            Self::Btc => "BTC",
            Self::Eth => "ETH",
            Self::Bnb => "BNB",
            Self::Ltc => "LTC",
            Self::Bch => "BCH",
            Self::Doge => "DOGE",
            Self::Gaia => "GAIA",
            Self::Avax => "AVAX",
        }
    }

    /// Address prefix used to recognise addresses on this chain
    pub fn address_prefix(&self) -> &'static str {
        match self {
            Self::Thor => "thor1",
            Self::Btc => "bc1",
            Self::Eth | Self::Avax => "0x",
            Self::Bnb => "bnb1",
            Self::Ltc => "ltc1",
            Self::Bch => "qq",
            Self::Doge => "D",
            Self::Gaia => "cosmos1",
        }
    }

    pub fn is_thorchain(&self) -> bool {
        matches!(self, Self::Thor)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "THOR" => Ok(Self::Thor),
            "BTC" => Ok(Self::Btc),
            "ETH" => Ok(Self::Eth),
            "BNB" => Ok(Self::Bnb),
            "LTC" => Ok(Self::Ltc),
            "BCH" => Ok(Self::Bch),
            "DOGE" => Ok(Self::Doge),
            "GAIA" => Ok(Self::Gaia),
            "AVAX" => Ok(Self::Avax),
            other => Err(Error::unknown_request(format!("unknown chain: {other}"))),
        }
    }
}

/// Address on the native chain or an external chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn noop() -> Self {
        Self(constants::NOOP_ADDRESS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.0 == constants::NOOP_ADDRESS
    }

    /// Check if this address belongs to the given chain
    pub fn is_chain(&self, chain: Chain) -> bool {
        !self.is_empty() && self.0.starts_with(chain.address_prefix())
    }

    /// Address of a protocol module on the native chain
    pub fn module(name: &str) -> Self {
        Self(format!("{}{}", Chain::Thor.address_prefix(), name))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public key (hex-encoded)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PubKey(pub String);

impl PubKey {
    /// Create a pubkey, rejecting anything that is not hex
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        hex::decode(&key).map_err(|e| Error::InvalidAddress {
            message: format!("invalid pubkey {key}: {e}"),
        })?;
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Derive this key's address on a chain
    pub fn address(&self, chain: Chain) -> Result<Address> {
        let bytes = hex::decode(&self.0).map_err(|e| Error::InvalidAddress {
            message: format!("invalid pubkey {}: {e}", self.0),
        })?;
        let digest = Sha256::digest(&bytes);
        let body = hex::encode(&digest[..20]);
        Ok(Address(format!("{}{}", chain.address_prefix(), body)))
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction ID (32 bytes, hex-encoded)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into().to_ascii_uppercase();
        let bytes = hex::decode(&id).map_err(|e| Error::unknown_request(format!("invalid tx id {id}: {e}")))?;
        if bytes.len() != 32 {
            return Err(Error::unknown_request(format!(
                "invalid tx id {id}: expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(id))
    }

    /// Placeholder id for protocol-originated outbounds
    pub fn blank() -> Self {
        Self("0".repeat(64))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.is_empty() || self.0.bytes().all(|b| b == b'0')
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub asset: Asset,
    pub amount: u64,
}

impl Coin {
    pub fn new(asset: Asset, amount: u64) -> Self {
        Self { asset, amount }
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.asset)
    }
}

/// Find the coin of an asset in a list
pub fn find_coin<'a>(coins: &'a [Coin], asset: &Asset) -> Option<&'a Coin> {
    coins.iter().find(|c| &c.asset == asset)
}

/// Inbound or outbound transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub id: TxId,
    pub chain: Option<Chain>,
    pub from_address: Address,
    pub to_address: Address,
    pub coins: Vec<Coin>,
    #[serde(default)]
    pub gas: Vec<Coin>,
    #[serde(default)]
    pub memo: String,
}

impl Tx {
    /// Maximum memo length accepted on inbound transactions
    pub const MAX_MEMO_LEN: usize = 250;

    /// Check the transaction is well formed
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::unknown_request("tx id cannot be empty"));
        }
        if self.chain.is_none() {
            return Err(Error::unknown_request("chain cannot be empty"));
        }
        if self.from_address.is_empty() {
            return Err(Error::InvalidAddress {
                message: "from address cannot be empty".into(),
            });
        }
        if self.to_address.is_empty() {
            return Err(Error::InvalidAddress {
                message: "to address cannot be empty".into(),
            });
        }
        if self.coins.is_empty() {
            return Err(Error::unknown_request("coins cannot be empty"));
        }
        if self.memo.len() > Self::MAX_MEMO_LEN {
            return Err(Error::unknown_request(format!(
                "memo must not exceed {} bytes",
                Self::MAX_MEMO_LEN
            )));
        }
        Ok(())
    }

    pub fn coin(&self, asset: &Asset) -> Option<&Coin> {
        find_coin(&self.coins, asset)
    }
}

/// Inbound transaction as witnessed by a vault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTx {
    pub tx: Tx,
    /// Vault that received the inbound
    pub observed_pub_key: Option<PubKey>,
    pub block_height: BlockHeight,
    pub finalise_height: BlockHeight,
}

impl ObservedTx {
    pub fn new(tx: Tx, block_height: BlockHeight, observed_pub_key: Option<PubKey>) -> Self {
        Self {
            tx,
            observed_pub_key,
            block_height,
            finalise_height: block_height,
        }
    }
}

/// Consensus record of an inbound transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTxVoter {
    pub tx_id: TxId,
    pub tx: ObservedTx,
    /// Height outbounds for this inbound are scheduled at, 0 when none yet
    #[serde(default)]
    pub outbound_height: BlockHeight,
    #[serde(default)]
    pub out_txs: Vec<Tx>,
}

/// Semantic version of node software
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().trim_start_matches('v').splitn(3, '.');
        let mut next = |name: &str| -> Result<u64> {
            parts
                .next()
                .unwrap_or("0")
                .parse()
                .map_err(|_| Error::unknown_request(format!("invalid {name} in version {s}")))
        };
        Ok(Self {
            major: next("major")?,
            minor: next("minor")?,
            patch: next("patch")?,
        })
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
