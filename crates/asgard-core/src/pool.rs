//! Liquidity pool records

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asset::Asset;
use crate::share::mul_div;
use crate::types::BlockHeight;

/// Pool status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    #[default]
    Available,
    Staged,
    Suspended,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Staged => "staged",
            Self::Suspended => "suspended",
        };
        write!(f, "{s}")
    }
}

/// Constant-product pool pairing RUNE with one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub asset: Asset,
    pub balance_rune: u64,
    pub balance_asset: u64,
    /// Liquidity provider units
    #[serde(default)]
    pub lp_units: u64,
    /// Units backing outstanding synths
    #[serde(default)]
    pub synth_units: u64,
    /// Decimals of the external asset, 0 when unknown
    #[serde(default)]
    pub decimals: i64,
    #[serde(default)]
    pub status: PoolStatus,
    #[serde(default)]
    pub status_since: BlockHeight,
}

impl Pool {
    pub fn new(asset: Asset, balance_rune: u64, balance_asset: u64) -> Self {
        Self {
            asset,
            balance_rune,
            balance_asset,
            lp_units: 0,
            synth_units: 0,
            decimals: 0,
            status: PoolStatus::Available,
            status_since: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == PoolStatus::Available
    }

    /// A pool with either side at zero cannot price anything
    pub fn is_empty(&self) -> bool {
        self.balance_rune == 0 || self.balance_asset == 0
    }

    /// Liquidity and synth units together
    pub fn pool_units(&self) -> u64 {
        self.lp_units.saturating_add(self.synth_units)
    }

    /// Recompute `synth_units` for an outstanding synth supply and return
    /// the total pool units.
    ///
    /// Synth units are `lp_units * supply / (2 * balance_asset - supply)`,
    /// so synths own the share of the asset side they could redeem.
    pub fn calc_units(&mut self, synth_supply: u64) -> u64 {
        if self.balance_asset == 0 || self.asset.is_vault_asset() {
            self.synth_units = 0;
        } else {
            let numerator = u128::from(self.lp_units) * u128::from(synth_supply);
            let denominator = (2 * u128::from(self.balance_asset))
                .saturating_sub(u128::from(synth_supply))
                .max(1);
            self.synth_units = u64::try_from(numerator / denominator).unwrap_or(u64::MAX);
        }
        self.pool_units()
    }

    /// Value of `amt` asset units in RUNE at the current ratio
    pub fn asset_value_in_rune(&self, amt: u64) -> u64 {
        if self.is_empty() {
            return 0;
        }
        mul_div(amt, self.balance_rune, self.balance_asset)
    }

    /// Value of `amt` RUNE in asset units at the current ratio
    pub fn rune_value_in_asset(&self, amt: u64) -> u64 {
        if self.is_empty() {
            return 0;
        }
        mul_div(amt, self.balance_asset, self.balance_rune)
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool {} | RUNE: {} | Asset: {} | {}",
            self.asset, self.balance_rune, self.balance_asset, self.status
        )
    }
}
