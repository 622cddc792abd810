//! Network-wide aggregates

use serde::{Deserialize, Serialize};

use crate::types::BlockHeight;

/// Global accounting and ragnarok state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// RUNE accrued for bond rewards since the last payout
    pub bond_reward_rune: u64,
    /// Active blocks accumulated by bonded nodes since the last payout
    #[serde(default)]
    pub total_bond_units: u64,
    /// Height ragnarok started at, 0 when not started
    #[serde(default)]
    pub ragnarok_block_height: BlockHeight,
    /// Ragnarok iteration counter
    #[serde(default)]
    pub ragnarok_nth: i64,
    /// Ragnarok outbounds still waiting to be signed
    #[serde(default)]
    pub ragnarok_pending: i64,
    /// Set once every pool has been moved to staged during ragnarok
    #[serde(default)]
    pub ragnarok_pools_staged: bool,
}

impl Network {
    pub fn ragnarok_in_progress(&self) -> bool {
        self.ragnarok_block_height > 0
    }
}
