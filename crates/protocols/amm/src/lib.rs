//! Asgard AMM
//!
//! Pools trade against RUNE with slip-based fees. Swap intents are queued
//! during a block and drained by [`SwapQueue::end_block`]; failures are
//! refunded through [`refund_tx`].

pub mod calculator;
pub mod handler;
pub mod refund;
pub mod swap_queue;
pub mod swapper;

// Re-exports
pub use calculator::{calc_asset_emission, calc_liquidity_fee, calc_swap_slip, virtual_depth};
pub use handler::handle_swap;
pub use refund::refund_tx;
pub use swap_queue::{get_todo_num, sort_items, SwapDispatcher, SwapItem, SwapQueue, CODE_SWAP_FAIL};
pub use swapper::{SwapOutcome, Swapper};
