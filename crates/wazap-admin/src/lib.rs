//! Policy layer over the provider's group-mutating operations: named admin
//! commands, authorization checks, the anti-link detector, and per-group
//! configuration storage. The dispatcher is the only caller — this crate
//! knows nothing about text parsing or the provider's wire format.

pub mod antilink;
pub mod commands;
pub mod config_store;
pub mod error;
pub mod permissions;

pub use commands::{AdminCommands, CommandOutcome};
pub use config_store::GroupConfigStore;
pub use error::{AdminError, Result};
pub use permissions::{PermissionCheck, PermissionChecker};
