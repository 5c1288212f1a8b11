//! Group fan-out broadcast engine (spec §4.L).
//!
//! # Overview
//!
//! [`BroadcastEngine::broadcast`] sends one payload to a list of group ids
//! through concurrent workers. Concurrency, pre-send jitter, retry count, and
//! backoff base all come from a `BroadcastModeConfig` preset
//! (`wazap_core::config::BroadcastConfig`: `default`/`fast`/`safe`). A single
//! rate-limit hit extends a process-wide "paused until" gate that every
//! worker honors before its next send, rather than only backing off its own
//! retry.
//!
//! A single group's failure never aborts the batch — the engine always runs
//! every group to completion and returns a [`TerminalReport`] summarizing
//! what happened.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::BroadcastEngine;
pub use error::{BroadcastError, Result};
pub use types::{BroadcastMode, TerminalReport};
