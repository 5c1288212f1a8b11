use serde_json::Value as Json;

/// Why the provider closed the connection. `LoggedOut` is the one reason
/// the connection supervisor must not reconnect from — it means the
/// credentials themselves were invalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    LoggedOut,
    ConnectionLost,
    ConnectionReplaced,
    RestartRequired,
    Unknown(String),
}

impl DisconnectReason {
    pub fn is_hard_logout(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }
}

/// One of the twenty-plus event kinds the provider's event bus emits.
/// Variants carry the raw JSON payload — the event router's handlers are
/// responsible for interpreting shape, not this enum.
#[derive(Debug, Clone)]
pub enum SdkEvent {
    CredentialUpdate(Json),
    ConnectionOpen,
    ConnectionClose { reason: DisconnectReason },
    ConnectionQr { qr: String },
    MessagesUpsert(Json),
    MessagesUpdate(Json),
    MessagesReaction(Json),
    GroupsUpsert(Json),
    GroupsUpdate(Json),
    GroupParticipantsUpdate(Json),
    GroupJoinRequest(Json),
    ChatsUpsert(Json),
    ChatsUpdate(Json),
    ChatsDelete(Json),
    ContactsUpsert(Json),
    ContactsUpdate(Json),
    LidMappingUpdate(Json),
    PresenceUpdate(Json),
    Blocklist(Json),
    Call(Json),
    Newsletter(Json),
}

impl SdkEvent {
    /// A stable short name used as the metrics/log key — not the enum's
    /// `Debug` form, which would change if variants are reordered.
    pub fn kind(&self) -> &'static str {
        match self {
            SdkEvent::CredentialUpdate(_) => "credential-update",
            SdkEvent::ConnectionOpen => "connection-open",
            SdkEvent::ConnectionClose { .. } => "connection-close",
            SdkEvent::ConnectionQr { .. } => "connection-qr",
            SdkEvent::MessagesUpsert(_) => "messages.upsert",
            SdkEvent::MessagesUpdate(_) => "messages.update",
            SdkEvent::MessagesReaction(_) => "messages.reaction",
            SdkEvent::GroupsUpsert(_) => "groups.upsert",
            SdkEvent::GroupsUpdate(_) => "groups.update",
            SdkEvent::GroupParticipantsUpdate(_) => "group-participants.update",
            SdkEvent::GroupJoinRequest(_) => "group.join-request",
            SdkEvent::ChatsUpsert(_) => "chats.upsert",
            SdkEvent::ChatsUpdate(_) => "chats.update",
            SdkEvent::ChatsDelete(_) => "chats.delete",
            SdkEvent::ContactsUpsert(_) => "contacts.upsert",
            SdkEvent::ContactsUpdate(_) => "contacts.update",
            SdkEvent::LidMappingUpdate(_) => "lid-mapping.update",
            SdkEvent::PresenceUpdate(_) => "presence.update",
            SdkEvent::Blocklist(_) => "blocklist",
            SdkEvent::Call(_) => "call",
            SdkEvent::Newsletter(_) => "newsletter",
        }
    }
}
