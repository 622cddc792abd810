//! Asgard-core: Shared types, errors, and configuration
//!
//! This crate provides the foundational types used across the Asgard workspace.

pub mod asset;
pub mod config;
pub mod errors;
pub mod events;
pub mod msgs;
pub mod network;
pub mod node;
pub mod pool;
pub mod share;
pub mod txout;
pub mod types;
pub mod vault;

pub use asset::*;
pub use config::*;
pub use errors::*;
pub use events::*;
pub use msgs::*;
pub use network::*;
pub use node::*;
pub use pool::*;
pub use txout::*;
pub use types::*;
pub use vault::*;
