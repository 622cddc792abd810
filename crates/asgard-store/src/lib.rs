//! Asgard-store: Chain state storage
//!
//! A checkpointed key-value store, the typed keeper on top of it, and the
//! outbound queue every handler schedules payouts through.

pub mod keeper;
pub mod kv;
pub mod txout_store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use keeper::{Keeper, KeygenBlock, QueuedSwap};
pub use kv::KvStore;
pub use txout_store::TxOutStore;
