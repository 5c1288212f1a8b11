//! An in-memory `Session` used by the core crates' own test suites —
//! nothing here talks to a real provider.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Result, SdkError};
use crate::event::SdkEvent;
use crate::session::{JoinRequestAction, MemberAddMode, ParticipantAction, Session, SessionFactory};

pub struct FakeSession {
    sent: Mutex<Vec<(String, serde_json::Value)>>,
    next_message_id: Mutex<u64>,
    pub fail_send: bool,
    invite_code: Mutex<String>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(1),
            fail_send: false,
            invite_code: Mutex::new("FAKEINVITE0".to_string()),
        }
    }

    pub fn sent_messages(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().expect("fake session lock poisoned").clone()
    }
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn connect(&self) -> Result<mpsc::Receiver<SdkEvent>> {
        let (_tx, rx) = mpsc::channel(16);
        Ok(rx)
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn send(&self, chat_id: &str, content: serde_json::Value) -> Result<String> {
        if self.fail_send {
            return Err(SdkError::SendFailed("fake session configured to fail".to_string()));
        }
        let mut next = self.next_message_id.lock().expect("fake session lock poisoned");
        let id = format!("FAKE{}", *next);
        *next += 1;
        self.sent
            .lock()
            .expect("fake session lock poisoned")
            .push((chat_id.to_string(), content));
        Ok(id)
    }

    async fn fetch_group_metadata(&self, group_id: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "id": group_id,
            "subject": "Fake Group",
            "participants": [],
        }))
    }

    async fn group_update_participants(
        &self,
        _group_id: &str,
        _participant_ids: &[String],
        _action: ParticipantAction,
    ) -> Result<()> {
        Ok(())
    }

    async fn group_set_subject(&self, _group_id: &str, _subject: &str) -> Result<()> {
        Ok(())
    }

    async fn group_set_description(&self, _group_id: &str, _description: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_message(&self, _chat_id: &str, _message_id: &str) -> Result<()> {
        Ok(())
    }

    async fn react(&self, _chat_id: &str, _message_id: &str, _emoji: &str) -> Result<()> {
        Ok(())
    }

    async fn group_leave(&self, _group_id: &str) -> Result<()> {
        Ok(())
    }

    async fn group_invite_code(&self, _group_id: &str) -> Result<String> {
        Ok(self.invite_code.lock().expect("fake session lock poisoned").clone())
    }

    async fn group_revoke_invite(&self, group_id: &str) -> Result<String> {
        let new_code = format!("FAKEINVITE{}rev", group_id.len());
        *self.invite_code.lock().expect("fake session lock poisoned") = new_code.clone();
        Ok(new_code)
    }

    async fn group_accept_invite(&self, code: &str) -> Result<String> {
        Ok(format!("joined-via-{code}@g.us"))
    }

    async fn group_info_from_invite(&self, code: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({"subject": "Fake Invited Group", "code": code}))
    }

    async fn group_set_ephemeral(&self, _group_id: &str, _duration_secs: Option<u64>) -> Result<()> {
        Ok(())
    }

    async fn group_set_member_add_mode(&self, _group_id: &str, _mode: MemberAddMode) -> Result<()> {
        Ok(())
    }

    async fn group_join_requests(&self, _group_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn group_update_join_requests(
        &self,
        _group_id: &str,
        _participant_ids: &[String],
        _action: JoinRequestAction,
    ) -> Result<()> {
        Ok(())
    }
}

pub struct FakeSessionFactory;

impl SessionFactory for FakeSessionFactory {
    fn build(&self) -> Box<dyn Session> {
        Box::new(FakeSession::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_records_the_message() {
        let session = FakeSession::new();
        let id = session.send("Gx@g.us", serde_json::json!({"text": "hi"})).await.unwrap();
        assert_eq!(id, "FAKE1");
        assert_eq!(session.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn send_fails_when_configured() {
        let mut session = FakeSession::new();
        session.fail_send = true;
        let result = session.send("Gx@g.us", serde_json::json!({"text": "hi"})).await;
        assert!(result.is_err());
    }
}
