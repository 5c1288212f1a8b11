//! The storage gateway — the only component in the workspace that owns the
//! relational connection pool. Everything else (queue, cache, identity,
//! groups, admin) goes through [`Gateway`].

pub mod error;
pub mod gateway;
pub mod schema;

pub use error::{Result, StorageError};
pub use gateway::Gateway;
