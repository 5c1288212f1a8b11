//! Serialized, ordered, back-pressured write pipeline for messages, chats,
//! and identity-mapping upserts (spec §4.B) sitting in front of
//! [`wazap_storage::Gateway`].

pub mod error;
pub mod ops;
pub mod queue;

pub use error::{QueueError, Result};
pub use ops::WriteOp;
pub use queue::{QueueShutdown, WriteQueue, WriteQueueHandle};

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use serde_json::json;
    use wazap_storage::gateway::ChatRow;

    // `apply_with_retry` and the consumer loop need a live `Gateway`
    // (a real MySQL instance) to exercise end-to-end — out of scope for
    // this crate's unit tests. What's tested here is the op bookkeeping
    // (keys, kinds) and the handle's own channel/back-pressure behavior.

    fn sample_message_op() -> WriteOp {
        ops::insert_message_op(
            "Gx@g.us",
            "ABC123",
            "5511999999999@s.whatsapp.net",
            "ping",
            json!({"text": "ping"}),
            Utc::now(),
        )
    }

    #[test]
    fn write_op_key_for_message_combines_chat_and_message_id() {
        let op = sample_message_op();
        assert_eq!(op.key(), "Gx@g.us:ABC123");
        assert_eq!(op.kind(), "insert_message");
    }

    #[test]
    fn write_op_key_for_chat_upsert_is_chat_id() {
        let op = WriteOp::UpsertChat {
            row: ChatRow {
                id: "Gx@g.us".to_string(),
                name: Some("Test".to_string()),
                raw_chat: json!({}),
                updated_at: Utc::now(),
            },
            partial: false,
            force_name: true,
        };
        assert_eq!(op.key(), "Gx@g.us");
    }

    #[test]
    fn write_op_key_for_identity_mapping_is_lid() {
        let op = WriteOp::UpsertIdentityMapping {
            lid: "L1@lid".to_string(),
            jid: None,
            seen_at: Utc::now(),
            source: "message".to_string(),
        };
        assert_eq!(op.key(), "L1@lid");
    }

    #[tokio::test]
    async fn enqueue_increments_depth_until_consumed() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let handle = queue::WriteQueueHandle::from_parts(tx);

        handle.enqueue(sample_message_op()).await.unwrap();
        assert_eq!(handle.depth(), 1);

        let _ = rx.recv().await;
    }

    #[tokio::test]
    async fn try_enqueue_reports_full_without_blocking() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let handle = queue::WriteQueueHandle::from_parts(tx);

        handle.try_enqueue(sample_message_op()).unwrap();
        let result = handle.try_enqueue(sample_message_op());
        assert!(matches!(result, Err(QueueError::Full)));
    }
}
