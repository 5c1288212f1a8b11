//! Authorization checks for admin commands. Distinguishes "hard no" from
//! "allowed" the same way callers pattern-match rather than catching errors.

use wazap_core::types::CanonicalId;
use wazap_groups::GroupMetadataService;
use wazap_sdk::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Allowed,
    Denied { reason: String },
}

impl PermissionCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionCheck::Allowed)
    }
}

pub struct PermissionChecker;

impl PermissionChecker {
    /// Every group-mutating command requires the sender to be an admin of
    /// the target group (resolved via the read-through group metadata
    /// service).
    pub async fn check_group_admin(
        groups: &GroupMetadataService,
        session: &dyn Session,
        group_id: &str,
        sender: &CanonicalId,
    ) -> PermissionCheck {
        let meta = match groups.get_or_fetch(group_id, session).await {
            Ok(meta) => meta,
            Err(e) => {
                return PermissionCheck::Denied {
                    reason: format!("could not load group metadata: {e}"),
                }
            }
        };
        match meta.participants.iter().find(|p| &p.id == sender) {
            Some(p) if p.role.is_admin() => PermissionCheck::Allowed,
            Some(_) => PermissionCheck::Denied {
                reason: "admin privileges required".to_string(),
            },
            None => PermissionCheck::Denied {
                reason: "not a member of this group".to_string(),
            },
        }
    }

    /// `premium` management is restricted to the configured owner id.
    pub fn check_owner(owner_id: Option<&str>, sender: &CanonicalId) -> PermissionCheck {
        match owner_id {
            Some(owner) if owner == sender.as_str() => PermissionCheck::Allowed,
            _ => PermissionCheck::Denied {
                reason: "owner only".to_string(),
            },
        }
    }

    /// The bot itself may never be the target of a remove/demote operation.
    pub fn check_not_bot_target(target: &CanonicalId, bot_id: &CanonicalId) -> PermissionCheck {
        if target == bot_id {
            PermissionCheck::Denied {
                reason: "cannot target the bot itself".to_string(),
            }
        } else {
            PermissionCheck::Allowed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_owner_rejects_non_owner() {
        let sender = CanonicalId::from("222@s.whatsapp.net");
        assert!(!PermissionChecker::check_owner(Some("111@s.whatsapp.net"), &sender).is_allowed());
    }

    #[test]
    fn check_owner_allows_configured_owner() {
        let sender = CanonicalId::from("111@s.whatsapp.net");
        assert!(PermissionChecker::check_owner(Some("111@s.whatsapp.net"), &sender).is_allowed());
    }

    #[test]
    fn check_owner_denies_when_unconfigured() {
        let sender = CanonicalId::from("111@s.whatsapp.net");
        assert!(!PermissionChecker::check_owner(None, &sender).is_allowed());
    }

    #[test]
    fn check_not_bot_target_blocks_self_target() {
        let bot = CanonicalId::from("BOT@s.whatsapp.net");
        assert!(!PermissionChecker::check_not_bot_target(&bot, &bot).is_allowed());
    }

    #[test]
    fn check_not_bot_target_allows_other_participants() {
        let bot = CanonicalId::from("BOT@s.whatsapp.net");
        let other = CanonicalId::from("222@s.whatsapp.net");
        assert!(PermissionChecker::check_not_bot_target(&other, &bot).is_allowed());
    }
}
