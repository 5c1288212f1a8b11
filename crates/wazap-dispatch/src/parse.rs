//! Pulls the fields the pipeline needs out of a raw `messages.upsert`
//! payload. Mirrors the provider's wrapper shape: a `messages` array of
//! entries, each carrying a `key` (chat/sender/id), the variably-typed
//! `message` content object, and a handful of top-level scalars.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

/// One inbound message, fields already pulled out of the raw shape.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: String,
    pub message_id: String,
    pub from_me: bool,
    /// Sender id as the provider reported it — lid-form or jid-form,
    /// not yet resolved to canonical.
    pub sender_lid: String,
    pub sender_alt_jid: Option<String>,
    pub push_name: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub raw: Json,
}

pub fn extract_messages(raw: &Json) -> Vec<InboundMessage> {
    raw.get("messages")
        .and_then(Json::as_array)
        .map(|items| items.iter().filter_map(parse_one).collect())
        .unwrap_or_default()
}

fn parse_one(raw: &Json) -> Option<InboundMessage> {
    let key = raw.get("key")?;
    let chat_id = key.get("remoteJid").and_then(Json::as_str)?.to_string();
    let message_id = key.get("id").and_then(Json::as_str)?.to_string();
    let from_me = key.get("fromMe").and_then(Json::as_bool).unwrap_or(false);

    let sender_lid = key
        .get("participant")
        .and_then(Json::as_str)
        .unwrap_or(&chat_id)
        .to_string();
    let sender_alt_jid = raw
        .get("participantAlt")
        .and_then(Json::as_str)
        .map(str::to_string);

    let push_name = raw.get("pushName").and_then(Json::as_str).map(str::to_string);

    let content = extract_text(raw.get("message").unwrap_or(&Json::Null));

    let timestamp = raw
        .get("messageTimestamp")
        .and_then(Json::as_i64)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(InboundMessage {
        chat_id,
        message_id,
        from_me,
        sender_lid,
        sender_alt_jid,
        push_name,
        content,
        timestamp,
        raw: raw.clone(),
    })
}

/// Covers plain text, extended-text (links/quotes), and media-caption
/// shapes. Anything else (stickers, polls, reactions) yields an empty
/// string — the caller treats that as "no text command possible".
pub fn extract_text(message: &Json) -> String {
    if let Some(text) = message.get("conversation").and_then(Json::as_str) {
        return text.to_string();
    }
    if let Some(text) = message
        .get("extendedTextMessage")
        .and_then(|m| m.get("text"))
        .and_then(Json::as_str)
    {
        return text.to_string();
    }
    for caption_holder in ["imageMessage", "videoMessage", "documentMessage"] {
        if let Some(caption) = message
            .get(caption_holder)
            .and_then(|m| m.get("caption"))
            .and_then(Json::as_str)
        {
            return caption.to_string();
        }
    }
    String::new()
}

/// Present on stickers, images, and videos — the dispatcher's
/// auto-sticker fallback (step 7) only fires on these.
pub fn has_sticker_eligible_media(message: &Json) -> bool {
    message.get("stickerMessage").is_some()
        || message.get("imageMessage").is_some()
        || message.get("videoMessage").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_text_reads_plain_conversation() {
        assert_eq!(extract_text(&json!({"conversation": "hi"})), "hi");
    }

    #[test]
    fn extract_text_reads_extended_text() {
        let msg = json!({"extendedTextMessage": {"text": "check this out"}});
        assert_eq!(extract_text(&msg), "check this out");
    }

    #[test]
    fn extract_text_reads_image_caption() {
        let msg = json!({"imageMessage": {"caption": "look"}});
        assert_eq!(extract_text(&msg), "look");
    }

    #[test]
    fn extract_text_empty_for_unrecognized_shape() {
        assert_eq!(extract_text(&json!({"stickerMessage": {}})), "");
    }

    #[test]
    fn extract_messages_parses_group_entry_with_participant() {
        let raw = json!({
            "messages": [{
                "key": {"remoteJid": "Gx@g.us", "id": "ABC1", "fromMe": false, "participant": "111@lid"},
                "message": {"conversation": "hello"},
                "pushName": "Alice",
                "participantAlt": "5511999999999@s.whatsapp.net",
                "messageTimestamp": 1_700_000_000,
            }]
        });
        let messages = extract_messages(&raw);
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert_eq!(m.chat_id, "Gx@g.us");
        assert_eq!(m.sender_lid, "111@lid");
        assert_eq!(m.sender_alt_jid.as_deref(), Some("5511999999999@s.whatsapp.net"));
        assert_eq!(m.content, "hello");
    }

    #[test]
    fn extract_messages_private_chat_sender_falls_back_to_chat_id() {
        let raw = json!({
            "messages": [{
                "key": {"remoteJid": "5511999999999@s.whatsapp.net", "id": "ABC2", "fromMe": false},
                "message": {"conversation": "hi"},
                "messageTimestamp": 1_700_000_000,
            }]
        });
        let messages = extract_messages(&raw);
        assert_eq!(messages[0].sender_lid, "5511999999999@s.whatsapp.net");
    }

    #[test]
    fn extract_messages_skips_entries_missing_key() {
        let raw = json!({"messages": [{"message": {"conversation": "no key"}}]});
        assert!(extract_messages(&raw).is_empty());
    }
}
