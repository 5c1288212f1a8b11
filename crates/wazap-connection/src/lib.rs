//! Connection supervisor and event demultiplexer: owns the single logical
//! long-lived session to the messaging provider, reconnects with
//! rolling-window exponential backoff, and fans inbound events out to
//! per-kind handlers behind a generational guard.

pub mod backoff;
pub mod error;
pub mod router;
pub mod state;
pub mod supervisor;

pub use error::{ConnectionError, Result};
pub use router::{EventRouter, HandlerFn};
pub use state::ConnectionState;
pub use supervisor::{ConnectionSupervisor, ConnectionSupervisorConfig, OnOpenHook};
