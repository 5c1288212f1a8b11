use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::event::SdkEvent;

/// A single logical long-lived connection to the messaging provider.
/// Owned exclusively by the connection supervisor — every other component
/// treats it as read-only (send-only, in practice).
#[async_trait]
pub trait Session: Send + Sync {
    /// Establish the connection and return a receiver of the session's
    /// event stream. A new call after a prior `connect` must discard the
    /// old socket reference (its events are the prior generation's).
    async fn connect(&self) -> Result<mpsc::Receiver<SdkEvent>>;

    async fn disconnect(&self) -> Result<()>;

    /// Send outbound content to `chat_id`. Returns the provider-assigned
    /// message id on success.
    async fn send(&self, chat_id: &str, content: serde_json::Value) -> Result<String>;

    /// Fetch a fresh copy of group metadata (used by the group metadata
    /// service's `getOrFetch` slow path).
    async fn fetch_group_metadata(&self, group_id: &str) -> Result<serde_json::Value>;

    /// Group-mutating operations (add/remove/promote/demote participants,
    /// subject/description, invite code, ephemeral duration, etc).
    async fn group_update_participants(
        &self,
        group_id: &str,
        participant_ids: &[String],
        action: ParticipantAction,
    ) -> Result<()>;

    async fn group_set_subject(&self, group_id: &str, subject: &str) -> Result<()>;
    async fn group_set_description(&self, group_id: &str, description: &str) -> Result<()>;
    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()>;

    /// React to a message with an emoji (used by the dispatcher's
    /// command-acknowledgement step). Best-effort at the call site —
    /// failures here must never abort command handling.
    async fn react(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<()>;

    /// Leave a group the bot is a member of.
    async fn group_leave(&self, group_id: &str) -> Result<()>;

    /// Current invite code, unchanged since the last revocation.
    async fn group_invite_code(&self, group_id: &str) -> Result<String>;

    /// Invalidates the previous invite code and returns the new one.
    async fn group_revoke_invite(&self, group_id: &str) -> Result<String>;

    /// Joins the group identified by an invite code; returns the group id.
    async fn group_accept_invite(&self, code: &str) -> Result<String>;

    /// Previews a group's public metadata from an invite code without
    /// joining it.
    async fn group_info_from_invite(&self, code: &str) -> Result<serde_json::Value>;

    /// `None` disables disappearing messages; `Some(seconds)` sets the
    /// ephemeral message duration.
    async fn group_set_ephemeral(&self, group_id: &str, duration_secs: Option<u64>) -> Result<()>;

    /// Controls who may add new members to the group.
    async fn group_set_member_add_mode(&self, group_id: &str, mode: MemberAddMode) -> Result<()>;

    /// Pending join requests awaiting admin approval (only relevant when
    /// the group requires approval to join).
    async fn group_join_requests(&self, group_id: &str) -> Result<Vec<String>>;

    async fn group_update_join_requests(
        &self,
        group_id: &str,
        participant_ids: &[String],
        action: JoinRequestAction,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAddMode {
    AllParticipants,
    AdminsOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRequestAction {
    Approve,
    Reject,
}

/// Constructs a `Session` from loaded credentials and a pinned SDK version
/// hint — the connection supervisor depends on this, not a concrete type,
/// so tests can substitute `fake::FakeSession`.
pub trait SessionFactory: Send + Sync {
    fn build(&self) -> Box<dyn Session>;
}
