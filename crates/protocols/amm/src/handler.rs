//! Swap handler
//!
//! Entry point the message dispatcher calls for a queued `MsgSwap`.

use asgard_core::{ConstantName, MsgSwap, Result};
use asgard_store::Keeper;

use crate::swapper::{SwapOutcome, Swapper};

/// Validate and execute a swap.
///
/// Runs inside a store checkpoint: on any error every pool write, bank
/// transfer and event of the swap is discarded.
pub fn handle_swap(keeper: &mut Keeper, msg: &MsgSwap) -> Result<SwapOutcome> {
    msg.validate_basic()?;

    let transaction_fee = keeper.get_config_i64(ConstantName::OutboundTransactionFee).max(0) as u64;
    let synth_mult = keeper.get_config_i64_min(ConstantName::VirtualMultSynthsBasisPoints, 1) as u64;

    keeper.with_checkpoint(|k| Swapper::new().swap(k, msg, transaction_fee, synth_mult))
}
