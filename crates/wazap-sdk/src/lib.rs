//! The boundary between the core and the messaging provider's wire
//! protocol. The core never speaks the protocol itself — it consumes a
//! `Session` trait object that exposes connect/disconnect/send and an
//! event stream, plus an `AuthStore` for the multi-file credential format.
//! A `fake` implementation backs the core's own tests.

pub mod auth;
pub mod error;
pub mod event;
pub mod fake;
pub mod session;

pub use auth::{AuthStore, Credentials};
pub use error::{Result, SdkError};
pub use event::{DisconnectReason, SdkEvent};
pub use session::{JoinRequestAction, MemberAddMode, ParticipantAction, Session, SessionFactory};
