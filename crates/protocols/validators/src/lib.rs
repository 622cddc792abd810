//! Asgard validators
//!
//! Everything that moves nodes in and out of the active set: churn
//! scheduling and eviction in [`ValidatorManager`], bond reward payouts,
//! the ragnarok shutdown, and the bond and unbond message handlers.

pub mod actors;
pub mod bond;
pub mod churn;
pub mod manager;
pub mod ragnarok;
pub mod rewards;
pub mod unbond;
pub mod yggdrasil;

// Re-exports
pub use actors::{
    find_bad_actors, find_low_bond_actor, find_old_actor, mark_low_version_validators,
    mark_ready_actors, node_account_preflight_check,
};
pub use bond::handle_bond;
pub use churn::{find_count_to_remove, find_max_able_to_leave, get_hard_bond_cap, split_next};
pub use manager::{next_churn_height, ValidatorManager, ValidatorUpdate, VALIDATOR_POWER};
pub use ragnarok::process_ragnarok;
pub use rewards::distribute_bond_reward;
pub use unbond::{handle_unbond, refund_bond};
pub use yggdrasil::{recall_ygg_funds, request_ygg_return};
