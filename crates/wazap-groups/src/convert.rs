use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use wazap_core::types::{AdminRole, CanonicalId, GroupMetadata, Participant};
use wazap_storage::gateway::GroupMetadataRow;

use crate::error::{GroupsError, Result};

/// Parses the provider's raw `fetch_group_metadata` payload into the
/// workspace's canonical `GroupMetadata` shape. Participant ids arrive
/// lid-form or jid-form depending on the conversation's privacy mode —
/// normalizing those against the identity resolver happens one layer up,
/// in the event router, since this service has no resolver dependency.
pub fn parse_raw_metadata(group_id: &str, raw: &Json) -> Result<GroupMetadata> {
    let subject = raw
        .get("subject")
        .and_then(Json::as_str)
        .unwrap_or_default()
        .to_string();
    let description = raw
        .get("desc")
        .or_else(|| raw.get("description"))
        .and_then(Json::as_str)
        .map(str::to_string);
    let owner = raw
        .get("owner")
        .and_then(Json::as_str)
        .map(CanonicalId::from);
    let creation = raw
        .get("creation")
        .and_then(Json::as_i64)
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.with_timezone(&Utc));

    let participants = raw
        .get("participants")
        .and_then(Json::as_array)
        .ok_or_else(|| GroupsError::MalformedPayload("missing participants array".to_string()))?
        .iter()
        .map(parse_participant)
        .collect::<Result<Vec<_>>>()?;

    Ok(GroupMetadata {
        group_id: group_id.to_string(),
        subject,
        description,
        owner,
        creation,
        participants,
        updated_at: Utc::now(),
    })
}

fn parse_participant(raw: &Json) -> Result<Participant> {
    let id = raw
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| GroupsError::MalformedPayload("participant missing id".to_string()))?;
    let is_admin = raw.get("isAdmin").and_then(Json::as_bool).unwrap_or(false);
    let is_super_admin = raw
        .get("isSuperAdmin")
        .and_then(Json::as_bool)
        .unwrap_or(false);
    let role = if is_super_admin {
        AdminRole::SuperAdmin
    } else if is_admin {
        AdminRole::Admin
    } else {
        AdminRole::Member
    };
    Ok(Participant {
        id: CanonicalId::from(id),
        role,
    })
}

pub fn to_row(meta: &GroupMetadata) -> Result<GroupMetadataRow> {
    Ok(GroupMetadataRow {
        id: meta.group_id.clone(),
        subject: meta.subject.clone(),
        description: meta.description.clone(),
        owner: meta.owner.as_ref().map(|o| o.as_str().to_string()),
        creation: meta.creation,
        participants: serde_json::to_value(&meta.participants)
            .map_err(|e| GroupsError::MalformedPayload(e.to_string()))?,
        updated_at: meta.updated_at,
    })
}

pub fn from_row(row: GroupMetadataRow) -> Result<GroupMetadata> {
    let participants: Vec<Participant> = serde_json::from_value(row.participants)
        .map_err(|e| GroupsError::MalformedPayload(e.to_string()))?;
    Ok(GroupMetadata {
        group_id: row.id,
        subject: row.subject,
        description: row.description,
        owner: row.owner.map(CanonicalId::from),
        creation: row.creation,
        participants,
        updated_at: row.updated_at,
    })
}
