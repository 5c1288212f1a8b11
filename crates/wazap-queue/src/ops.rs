//! The three write-op kinds the queue accepts (spec §4.B). Additional bulk
//! kinds follow the same shape: a data payload plus enough identity to dedupe
//! and order correctly.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use wazap_storage::gateway::{ChatRow, MessageRow};

#[derive(Debug, Clone)]
pub enum WriteOp {
    InsertMessage(MessageRow),
    UpsertChat {
        row: ChatRow,
        /// `true` when the caller only has a partial view (e.g. a
        /// `chats.update` delta) — merges over the existing row rather than
        /// replacing it wholesale.
        partial: bool,
        /// `true` when the caller explicitly supplied a display name that
        /// should win even over a partial update.
        force_name: bool,
    },
    UpsertIdentityMapping {
        lid: String,
        jid: Option<String>,
        seen_at: DateTime<Utc>,
        source: String,
    },
    DeleteChat {
        id: String,
    },
}

impl WriteOp {
    /// The logical key this op mutates — used only for log correlation; the
    /// single-consumer channel already guarantees same-key ordering by
    /// virtue of global FIFO order.
    pub fn key(&self) -> String {
        match self {
            WriteOp::InsertMessage(row) => format!("{}:{}", row.chat_id, row.message_id),
            WriteOp::UpsertChat { row, .. } => row.id.clone(),
            WriteOp::UpsertIdentityMapping { lid, .. } => lid.clone(),
            WriteOp::DeleteChat { id } => id.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriteOp::InsertMessage(_) => "insert_message",
            WriteOp::UpsertChat { .. } => "upsert_chat",
            WriteOp::UpsertIdentityMapping { .. } => "upsert_identity_mapping",
            WriteOp::DeleteChat { .. } => "delete_chat",
        }
    }
}

/// Build an `InsertMessage` op from the already-resolved fields the event
/// router hands the queue.
pub fn insert_message_op(
    chat_id: impl Into<String>,
    message_id: impl Into<String>,
    sender_id: impl Into<String>,
    content: impl Into<String>,
    raw_message: Json,
    timestamp: DateTime<Utc>,
) -> WriteOp {
    let now = Utc::now();
    WriteOp::InsertMessage(MessageRow {
        chat_id: chat_id.into(),
        message_id: message_id.into(),
        sender_id: sender_id.into(),
        content: content.into(),
        raw_message,
        timestamp,
        created_at: now,
    })
}
