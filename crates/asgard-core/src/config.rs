//! Configuration types for Asgard
//!
//! Protocol constants with their per-environment defaults, the governance
//! (mimir) key names that override them, and the application config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::Chain;

/// Deployment flavour selecting constant defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Mainnet,
    Mocknet,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Mocknet => "mocknet",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Protocol constants; the name doubles as the mimir override key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstantName {
    MinimumNodesForBFT,
    DesiredValidatorSet,
    AsgardSize,
    ChurnInterval,
    ChurnRetryInterval,
    BadValidatorRedline,
    MinSlashPointsForBadValidator,
    MaxNodeToChurnOutForBadActors,
    MaxNodeToChurnOutForLowVersion,
    ChurnOutForLowVersionBlocks,
    NumberOfNewNodesPerChurn,
    SigningTransactionPeriod,
    MinimumBondInRune,
    SlashPenalty,
    NodeOperatorFee,
    MinSwapsPerBlock,
    MaxSwapsPerBlock,
    VirtualMultSynthsBasisPoints,
    ArtificialRagnarokBlockHeight,
    OutboundTransactionFee,
    NativeTransactionFee,
}

impl ConstantName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinimumNodesForBFT => "MinimumNodesForBFT",
            Self::DesiredValidatorSet => "DesiredValidatorSet",
            Self::AsgardSize => "AsgardSize",
            Self::ChurnInterval => "ChurnInterval",
            Self::ChurnRetryInterval => "ChurnRetryInterval",
            Self::BadValidatorRedline => "BadValidatorRedline",
            Self::MinSlashPointsForBadValidator => "MinSlashPointsForBadValidator",
            Self::MaxNodeToChurnOutForBadActors => "MaxNodeToChurnOutForBadActors",
            Self::MaxNodeToChurnOutForLowVersion => "MaxNodeToChurnOutForLowVersion",
            Self::ChurnOutForLowVersionBlocks => "ChurnOutForLowVersionBlocks",
            Self::NumberOfNewNodesPerChurn => "NumberOfNewNodesPerChurn",
            Self::SigningTransactionPeriod => "SigningTransactionPeriod",
            Self::MinimumBondInRune => "MinimumBondInRune",
            Self::SlashPenalty => "SlashPenalty",
            Self::NodeOperatorFee => "NodeOperatorFee",
            Self::MinSwapsPerBlock => "MinSwapsPerBlock",
            Self::MaxSwapsPerBlock => "MaxSwapsPerBlock",
            Self::VirtualMultSynthsBasisPoints => "VirtualMultSynthsBasisPoints",
            Self::ArtificialRagnarokBlockHeight => "ArtificialRagnarokBlockHeight",
            Self::OutboundTransactionFee => "OutboundTransactionFee",
            Self::NativeTransactionFee => "NativeTransactionFee",
        }
    }
}

impl fmt::Display for ConstantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Governance keys without a constant counterpart
pub mod mimir {
    use super::Chain;

    /// Height after which synths can no longer be burned
    pub const BURN_SYNTHS: &str = "BurnSynths";

    /// Height after which synths can no longer be minted
    pub const MINT_SYNTHS: &str = "MintSynths";

    /// Per-chain halt switch, e.g. `HaltBTCChain`
    pub fn halt_chain(chain: Chain) -> String {
        format!("Halt{chain}Chain")
    }
}

/// Constant table for one environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantValues {
    pub environment: Environment,
    values: HashMap<ConstantName, i64>,
}

impl ConstantValues {
    pub fn new(environment: Environment) -> Self {
        use ConstantName::*;

        let mut values: HashMap<ConstantName, i64> = [
            (MinimumNodesForBFT, 4),
            (DesiredValidatorSet, 100),
            (AsgardSize, 40),
            (ChurnInterval, 43_200),
            (ChurnRetryInterval, 720),
            (BadValidatorRedline, 3),
            (MinSlashPointsForBadValidator, 100),
            (MaxNodeToChurnOutForBadActors, 3),
            (MaxNodeToChurnOutForLowVersion, 1),
            (ChurnOutForLowVersionBlocks, 21_600),
            (NumberOfNewNodesPerChurn, 1),
            (SigningTransactionPeriod, 300),
            (MinimumBondInRune, 1_000_000_00000000),
            (SlashPenalty, 15_000),
            (NodeOperatorFee, 500),
            (MinSwapsPerBlock, 10),
            (MaxSwapsPerBlock, 100),
            (VirtualMultSynthsBasisPoints, 10_000),
            (ArtificialRagnarokBlockHeight, 0),
            (OutboundTransactionFee, 2_000000),
            (NativeTransactionFee, 2_000000),
        ]
        .into_iter()
        .collect();

        if environment == Environment::Mocknet {
            values.insert(ChurnInterval, 60);
            values.insert(ChurnRetryInterval, 30);
            values.insert(DesiredValidatorSet, 12);
            values.insert(MinimumBondInRune, 100_000_000);
            values.insert(AsgardSize, 6);
            values.insert(VirtualMultSynthsBasisPoints, 20_000);
        }

        Self {
            environment,
            values,
        }
    }

    pub fn get(&self, name: ConstantName) -> i64 {
        self.values.get(&name).copied().unwrap_or_default()
    }

    /// Override a value; used by genesis files and tests
    pub fn set(&mut self, name: ConstantName, value: i64) {
        self.values.insert(name, value);
    }
}

impl Default for ConstantValues {
    fn default() -> Self {
        Self::new(Environment::Mainnet)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Constant defaults to run with
    #[serde(default)]
    pub environment: Environment,

    /// Tracing filter directive (e.g., "asgard=debug,info")
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Genesis document to seed state from
    #[serde(default)]
    pub genesis_path: Option<String>,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Mainnet,
            log_filter: default_log_filter(),
            genesis_path: None,
        }
    }
}
