//! Asset identifiers
//!
//! Assets are written `CHAIN.SYMBOL` for layer-1 and derived assets and
//! `CHAIN/SYMBOL` for synthetic assets minted on the native chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result};
use crate::types::Chain;

/// Symbol of the native settlement token
pub const RUNE_SYMBOL: &str = "RUNE";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Asset {
    pub chain: Chain,
    pub symbol: String,
    pub synth: bool,
}

impl Asset {
    pub fn new(chain: Chain, symbol: impl Into<String>) -> Self {
        Self {
            chain,
            symbol: symbol.into().to_ascii_uppercase(),
            synth: false,
        }
    }

    pub fn synth(chain: Chain, symbol: impl Into<String>) -> Self {
        Self {
            synth: true,
            ..Self::new(chain, symbol)
        }
    }

    /// THOR.RUNE
    pub fn rune() -> Self {
        Self::new(Chain::Thor, RUNE_SYMBOL)
    }

    /// Ticker is the symbol up to the first `-` (contract suffix)
    pub fn ticker(&self) -> &str {
        self.symbol.split('-').next().unwrap_or(&self.symbol)
    }

    pub fn is_rune(&self) -> bool {
        !self.synth && self.symbol == RUNE_SYMBOL
    }

    pub fn is_native_rune(&self) -> bool {
        self.is_rune() && self.chain.is_thorchain()
    }

    pub fn is_synth(&self) -> bool {
        self.synth
    }

    /// Internal virtual asset living on the native chain
    pub fn is_derived(&self) -> bool {
        self.chain.is_thorchain() && !self.synth && !self.is_rune()
    }

    /// Synth-keyed pools back savers vaults and must never be swapped against
    pub fn is_vault_asset(&self) -> bool {
        self.synth
    }

    /// Chain the asset is held on; synths live on the native chain
    pub fn get_chain(&self) -> Chain {
        if self.synth {
            Chain::Thor
        } else {
            self.chain
        }
    }

    pub fn is_native(&self) -> bool {
        self.get_chain().is_thorchain()
    }

    /// Layer-1 asset backing this one
    pub fn layer1_asset(&self) -> Asset {
        if self.synth {
            return Self::new(self.chain, self.symbol.clone());
        }
        if self.is_derived() {
            if let Ok(chain) = self.ticker().parse::<Chain>() {
                return Self::new(chain, self.symbol.clone());
            }
        }
        self.clone()
    }

    /// Synthetic version of a layer-1 asset
    pub fn to_synth(&self) -> Asset {
        Self::synth(self.chain, self.symbol.clone())
    }

    /// Derived version of a layer-1 asset
    pub fn to_derived(&self) -> Asset {
        Self::new(Chain::Thor, self.symbol.clone())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.synth { '/' } else { '.' };
        write!(f, "{}{}{}", self.chain, sep, self.symbol)
    }
}

impl FromStr for Asset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (sep_idx, synth) = match (s.find('.'), s.find('/')) {
            (Some(i), None) => (i, false),
            (None, Some(i)) => (i, true),
            _ => {
                // bare "RUNE" is shorthand for the native token
                if s.eq_ignore_ascii_case(RUNE_SYMBOL) {
                    return Ok(Self::rune());
                }
                return Err(Error::unknown_request(format!("invalid asset: {s}")));
            }
        };
        let chain: Chain = s[..sep_idx].parse()?;
        let symbol = &s[sep_idx + 1..];
        if symbol.is_empty() {
            return Err(Error::unknown_request(format!("invalid asset: {s}")));
        }
        Ok(if synth {
            Self::synth(chain, symbol)
        } else {
            Self::new(chain, symbol)
        })
    }
}

impl TryFrom<String> for Asset {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Asset> for String {
    fn from(asset: Asset) -> Self {
        asset.to_string()
    }
}
