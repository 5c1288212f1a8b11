//! Command dispatch pipeline (spec §4.H): resolves a command's prefix for
//! its chat, reacts on recognized commands, authorizes and runs the handler,
//! and falls back to an auto-sticker responder or an unknown-command reply.
//! Sits downstream of the event router's `messages.upsert` registration and
//! upstream of every `wazap-admin` command.

pub mod dispatcher;
pub mod error;
pub mod parse;
pub mod registry;
pub mod send;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, Result};
pub use parse::InboundMessage;
pub use registry::{CommandContext, CommandHandler, CommandRegistry};
pub use send::{SendFacility, SendOptions};
