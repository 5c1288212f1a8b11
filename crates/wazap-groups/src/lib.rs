//! Read-through cache and staleness policy for WhatsApp group metadata
//! (spec §4.E), sitting between the event router / admin subsystem and the
//! provider session.

pub mod convert;
pub mod error;
pub mod manager;

pub use error::{GroupsError, Result};
pub use manager::{GroupMetadataService, GroupMetadataServiceConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_raw_metadata_reads_subject_owner_and_participants() {
        let raw = json!({
            "subject": "Team",
            "desc": "hello",
            "owner": "111@s.whatsapp.net",
            "creation": 1_700_000_000,
            "participants": [
                {"id": "111@s.whatsapp.net", "isSuperAdmin": true},
                {"id": "222@s.whatsapp.net", "isAdmin": true},
                {"id": "333@s.whatsapp.net"}
            ]
        });
        let meta = convert::parse_raw_metadata("Gx@g.us", &raw).unwrap();
        assert_eq!(meta.subject, "Team");
        assert_eq!(meta.description.as_deref(), Some("hello"));
        assert_eq!(meta.participant_count(), 3);
        assert_eq!(
            meta.owner.unwrap().as_str(),
            "111@s.whatsapp.net"
        );
    }

    #[test]
    fn parse_raw_metadata_rejects_missing_participants() {
        let raw = json!({"subject": "Team"});
        assert!(convert::parse_raw_metadata("Gx@g.us", &raw).is_err());
    }

    #[test]
    fn row_round_trip_preserves_participants() {
        let raw = json!({
            "subject": "Team",
            "participants": [{"id": "111@s.whatsapp.net", "isAdmin": true}]
        });
        let meta = convert::parse_raw_metadata("Gx@g.us", &raw).unwrap();
        let row = convert::to_row(&meta).unwrap();
        let back = convert::from_row(row).unwrap();
        assert_eq!(back.participants.len(), 1);
        assert_eq!(back.participants[0].role, wazap_core::types::AdminRole::Admin);
    }
}
