use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Identity source tag for an identity-mapping row — which event kind first
/// asserted the lid↔jid relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentitySource {
    Message,
    Contacts,
    LidMapping,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::Message => write!(f, "message"),
            IdentitySource::Contacts => write!(f, "contacts"),
            IdentitySource::LidMapping => write!(f, "lid-mapping"),
        }
    }
}

/// The canonical resolved form of a user id — jid-form when known, lid-form
/// otherwise. Never constructed directly outside `wazap-identity`; every
/// other component treats it as an opaque, already-resolved string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalId(pub String);

impl CanonicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CanonicalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CanonicalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A persistent record of one exchanged content item.
///
/// `(chat_id, message_id)` is unique. `sender_id` is always canonical —
/// never a lid-form id once a jid-form mapping is known — and is the one
/// field the reconciliation sweep is allowed to rewrite after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: CanonicalId,
    /// Structured, variably-typed payload as received from the SDK. Must
    /// round-trip losslessly.
    pub raw_message: Json,
    /// Derived plain-text extract, covering plain/extended-text/caption
    /// shapes. Empty when the message carries no text (media-only, etc.).
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A conversation container, either private (one-to-one) or group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub name: Option<String>,
    pub raw_chat: Json,
    pub updated_at: DateTime<Utc>,
}

/// A single group conversation's admin role, drawn from a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Member,
    Admin,
    SuperAdmin,
}

impl AdminRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, AdminRole::Admin | AdminRole::SuperAdmin)
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminRole::Member => write!(f, "member"),
            AdminRole::Admin => write!(f, "admin"),
            AdminRole::SuperAdmin => write!(f, "superadmin"),
        }
    }
}

/// One member of a group's participant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: CanonicalId,
    pub role: AdminRole,
}

/// Structured state of a group conversation. Created/replaced on a
/// full-sync sweep at connection-open; partially updated by granular
/// events. Participant ids are unique within the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub group_id: String,
    pub subject: String,
    pub description: Option<String>,
    pub owner: Option<CanonicalId>,
    pub creation: Option<DateTime<Utc>>,
    pub participants: Vec<Participant>,
    pub updated_at: DateTime<Utc>,
}

impl GroupMetadata {
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_participant(&self, id: &CanonicalId) -> bool {
        self.participants.iter().any(|p| &p.id == id)
    }

    /// Apply a `group-participants.update` diff (add/remove/promote/demote)
    /// to this copy. Adding an already-present participant is a no-op.
    pub fn apply_participant_add(&mut self, id: CanonicalId, role: AdminRole) {
        if !self.is_participant(&id) {
            self.participants.push(Participant { id, role });
        }
    }

    pub fn apply_participant_remove(&mut self, id: &CanonicalId) {
        self.participants.retain(|p| &p.id != id);
    }

    pub fn apply_participant_role(&mut self, id: &CanonicalId, role: AdminRole) {
        if let Some(p) = self.participants.iter_mut().find(|p| &p.id == id) {
            p.role = role;
        }
    }
}

/// Minimal user record upserted on contact events and mined from inbound
/// messages' push-name field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: CanonicalId,
    pub display_name: Option<String>,
    pub alt_id: Option<String>,
}

/// A row asserting that a lid-form id and a jid-form id refer to the same
/// person. `lid` is the primary key; `jid` is nullable until first
/// resolution. Once non-null, `jid` is never overwritten by a null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub lid: String,
    pub jid: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub source: IdentitySource,
}

impl IdentityMapping {
    /// The best available canonical id this mapping currently asserts:
    /// jid-form when known, lid-form otherwise.
    pub fn canonical(&self) -> CanonicalId {
        match &self.jid {
            Some(jid) => CanonicalId(jid.clone()),
            None => CanonicalId(self.lid.clone()),
        }
    }
}

/// Per-group key-value settings (welcome/farewell, anti-link policy,
/// command prefix override, news broadcasts, NSFW flag, etc.). Reads on a
/// missing key yield an empty mapping; writes merge shallowly over current.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GroupConfig {
    #[serde(default)]
    pub welcome_enabled: bool,
    pub welcome_template: Option<String>,
    #[serde(default)]
    pub farewell_enabled: bool,
    pub farewell_template: Option<String>,
    #[serde(default)]
    pub anti_link_enabled: bool,
    #[serde(default)]
    pub allowed_networks: BTreeSet<String>,
    #[serde(default)]
    pub allowed_domains: BTreeSet<String>,
    pub command_prefix: Option<String>,
    #[serde(default)]
    pub news_enabled: bool,
    #[serde(default)]
    pub nsfw_enabled: bool,
}

impl GroupConfig {
    /// Shallow-merge `patch` over `self` — only fields explicitly set in
    /// `patch` override; collections are replaced wholesale, not unioned.
    pub fn merge(&mut self, patch: GroupConfigPatch) {
        if let Some(v) = patch.welcome_enabled {
            self.welcome_enabled = v;
        }
        if let Some(v) = patch.welcome_template {
            self.welcome_template = Some(v);
        }
        if let Some(v) = patch.farewell_enabled {
            self.farewell_enabled = v;
        }
        if let Some(v) = patch.farewell_template {
            self.farewell_template = Some(v);
        }
        if let Some(v) = patch.anti_link_enabled {
            self.anti_link_enabled = v;
        }
        if let Some(v) = patch.allowed_networks {
            self.allowed_networks = v;
        }
        if let Some(v) = patch.allowed_domains {
            self.allowed_domains = v;
        }
        if let Some(v) = patch.command_prefix {
            self.command_prefix = Some(v);
        }
        if let Some(v) = patch.news_enabled {
            self.news_enabled = v;
        }
        if let Some(v) = patch.nsfw_enabled {
            self.nsfw_enabled = v;
        }
    }
}

/// A partial update over `GroupConfig`. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct GroupConfigPatch {
    pub welcome_enabled: Option<bool>,
    pub welcome_template: Option<String>,
    pub farewell_enabled: Option<bool>,
    pub farewell_template: Option<String>,
    pub anti_link_enabled: Option<bool>,
    pub allowed_networks: Option<BTreeSet<String>>,
    pub allowed_domains: Option<BTreeSet<String>>,
    pub command_prefix: Option<String>,
    pub news_enabled: Option<bool>,
    pub nsfw_enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mapping_canonical_prefers_jid() {
        let now = Utc::now();
        let mapping = IdentityMapping {
            lid: "L1@lid".to_string(),
            jid: Some("5511999999999@s.whatsapp.net".to_string()),
            first_seen: now,
            last_seen: now,
            source: IdentitySource::LidMapping,
        };
        assert_eq!(mapping.canonical().as_str(), "5511999999999@s.whatsapp.net");
    }

    #[test]
    fn identity_mapping_canonical_falls_back_to_lid() {
        let now = Utc::now();
        let mapping = IdentityMapping {
            lid: "L1@lid".to_string(),
            jid: None,
            first_seen: now,
            last_seen: now,
            source: IdentitySource::Message,
        };
        assert_eq!(mapping.canonical().as_str(), "L1@lid");
    }

    #[test]
    fn group_metadata_add_participant_is_idempotent() {
        let mut group = GroupMetadata {
            group_id: "Gx@g.us".to_string(),
            subject: "Test".to_string(),
            description: None,
            owner: None,
            creation: None,
            participants: vec![],
            updated_at: Utc::now(),
        };
        let id = CanonicalId::from("A1@s.whatsapp.net");
        group.apply_participant_add(id.clone(), AdminRole::Member);
        group.apply_participant_add(id.clone(), AdminRole::Admin);

        assert_eq!(group.participant_count(), 1);
        assert_eq!(group.participants[0].role, AdminRole::Member);
    }

    #[test]
    fn group_config_merge_only_touches_present_fields() {
        let mut config = GroupConfig {
            welcome_enabled: true,
            anti_link_enabled: true,
            ..GroupConfig::default()
        };
        config.merge(GroupConfigPatch {
            anti_link_enabled: Some(false),
            ..GroupConfigPatch::default()
        });

        assert!(config.welcome_enabled);
        assert!(!config.anti_link_enabled);
    }
}
