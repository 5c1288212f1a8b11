//! The single primitive the rest of the system uses to deliver a message:
//! send through the provider, then best-effort persist a copy of what was
//! sent. Send failures are the caller's problem; persistence failures are
//! logged and swallowed since the user-visible send already succeeded.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as Json;
use tracing::warn;
use wazap_core::types::CanonicalId;
use wazap_queue::ops::insert_message_op;
use wazap_queue::WriteQueueHandle;
use wazap_sdk::Session;

use crate::error::Result;
use crate::parse::extract_text;

/// Per-send options. `ephemeral_expiration` mirrors the inbound chat's
/// disappearing-message setting when the caller has it in context —
/// threading it through keeps outbound replies consistent with the
/// conversation's current ephemerality without a second round-trip.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub ephemeral_expiration_secs: Option<u64>,
}

pub struct SendFacility {
    session: Arc<dyn Session>,
    queue: WriteQueueHandle,
    bot_id: CanonicalId,
}

impl SendFacility {
    pub fn new(session: Arc<dyn Session>, queue: WriteQueueHandle, bot_id: CanonicalId) -> Self {
        Self { session, queue, bot_id }
    }

    /// Sends `content` to `chat_id` and, on success, enqueues a record of
    /// the outgoing message through the write queue. The enqueue is
    /// fire-and-forget: a full queue drops the copy with a log line rather
    /// than holding up a reply the user has already received.
    pub async fn send_and_store(&self, chat_id: &str, content: Json, opts: SendOptions) -> Result<String> {
        let mut payload = content;
        if let (Some(secs), Json::Object(map)) = (opts.ephemeral_expiration_secs, &mut payload) {
            map.insert("ephemeralExpiration".to_string(), Json::from(secs));
        }

        let message_id = self.session.send(chat_id, payload.clone()).await?;

        let op = insert_message_op(
            chat_id,
            message_id.clone(),
            self.bot_id.as_str(),
            extract_text(&payload),
            payload,
            Utc::now(),
        );
        if let Err(e) = self.queue.try_enqueue(op) {
            warn!(chat_id, message_id, error = %e, "outgoing message send succeeded but persistence was dropped");
        }

        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wazap_sdk::fake::FakeSession;

    #[tokio::test]
    async fn send_and_store_returns_provider_message_id() {
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let queue = WriteQueueHandle::from_parts(tx);
        let facility = SendFacility::new(
            Arc::new(FakeSession::new()),
            queue,
            CanonicalId::from("BOT@s.whatsapp.net"),
        );
        let id = facility
            .send_and_store("Gx@g.us", json!({"text": "hi"}), SendOptions::default())
            .await
            .unwrap();
        assert_eq!(id, "FAKE1");
    }

    #[tokio::test]
    async fn send_and_store_stamps_ephemeral_expiration() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let queue = WriteQueueHandle::from_parts(tx);
        let facility = SendFacility::new(
            Arc::new(FakeSession::new()),
            queue,
            CanonicalId::from("BOT@s.whatsapp.net"),
        );
        facility
            .send_and_store(
                "Gx@g.us",
                json!({"text": "hi"}),
                SendOptions { ephemeral_expiration_secs: Some(86_400) },
            )
            .await
            .unwrap();

        let op = rx.recv().await.expect("op enqueued");
        match op {
            wazap_queue::WriteOp::InsertMessage(row) => {
                assert_eq!(row.raw_message["ephemeralExpiration"], 86_400);
            }
            _ => panic!("expected InsertMessage"),
        }
    }
}
