//! The named operations exposed to the dispatcher: one method per admin
//! command. Each performs its own authorization check and returns the reply
//! text to send back to the chat — the dispatcher only needs to forward it.

use std::sync::Arc;

use wazap_core::types::{CanonicalId, GroupConfigPatch};
use wazap_groups::GroupMetadataService;
use wazap_sdk::session::{JoinRequestAction, MemberAddMode, ParticipantAction};
use wazap_sdk::Session;

use crate::config_store::GroupConfigStore;
use crate::error::{AdminError, Result};
use crate::permissions::{PermissionCheck, PermissionChecker};

pub struct AdminCommands {
    session: Arc<dyn Session>,
    groups: Arc<GroupMetadataService>,
    config_store: Arc<GroupConfigStore>,
    bot_id: CanonicalId,
    owner_id: Option<String>,
}

/// Either the command's reply text, or a denial reason — the dispatcher
/// sends either one back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Reply(String),
    Denied(String),
}

impl AdminCommands {
    pub fn new(
        session: Arc<dyn Session>,
        groups: Arc<GroupMetadataService>,
        config_store: Arc<GroupConfigStore>,
        bot_id: CanonicalId,
        owner_id: Option<String>,
    ) -> Self {
        Self {
            session,
            groups,
            config_store,
            bot_id,
            owner_id,
        }
    }

    async fn require_group_admin(&self, group_id: &str, sender: &CanonicalId) -> Option<CommandOutcome> {
        match PermissionChecker::check_group_admin(&self.groups, self.session.as_ref(), group_id, sender).await {
            PermissionCheck::Allowed => None,
            PermissionCheck::Denied { reason } => Some(CommandOutcome::Denied(reason)),
        }
    }

    fn require_owner(&self, sender: &CanonicalId) -> Option<CommandOutcome> {
        match PermissionChecker::check_owner(self.owner_id.as_deref(), sender) {
            PermissionCheck::Allowed => None,
            PermissionCheck::Denied { reason } => Some(CommandOutcome::Denied(reason)),
        }
    }

    fn reject_bot_targets(&self, targets: &[CanonicalId]) -> Option<CommandOutcome> {
        for target in targets {
            if let PermissionCheck::Denied { reason } =
                PermissionChecker::check_not_bot_target(target, &self.bot_id)
            {
                return Some(CommandOutcome::Denied(reason));
            }
        }
        None
    }

    async fn mutate_participants(
        &self,
        group_id: &str,
        sender: &CanonicalId,
        targets: &[CanonicalId],
        action: ParticipantAction,
        verb: &str,
    ) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        if matches!(action, ParticipantAction::Remove | ParticipantAction::Demote) {
            if let Some(denied) = self.reject_bot_targets(targets) {
                return Ok(denied);
            }
        }
        let ids: Vec<String> = targets.iter().map(|t| t.as_str().to_string()).collect();
        self.session.group_update_participants(group_id, &ids, action).await?;
        Ok(CommandOutcome::Reply(format!("{verb} {} participant(s).", ids.len())))
    }

    pub async fn add(&self, group_id: &str, sender: &CanonicalId, targets: &[CanonicalId]) -> Result<CommandOutcome> {
        self.mutate_participants(group_id, sender, targets, ParticipantAction::Add, "Added").await
    }

    pub async fn remove(&self, group_id: &str, sender: &CanonicalId, targets: &[CanonicalId]) -> Result<CommandOutcome> {
        self.mutate_participants(group_id, sender, targets, ParticipantAction::Remove, "Removed").await
    }

    pub async fn promote(&self, group_id: &str, sender: &CanonicalId, targets: &[CanonicalId]) -> Result<CommandOutcome> {
        self.mutate_participants(group_id, sender, targets, ParticipantAction::Promote, "Promoted").await
    }

    pub async fn demote(&self, group_id: &str, sender: &CanonicalId, targets: &[CanonicalId]) -> Result<CommandOutcome> {
        self.mutate_participants(group_id, sender, targets, ParticipantAction::Demote, "Demoted").await
    }

    pub async fn set_subject(&self, group_id: &str, sender: &CanonicalId, subject: &str) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        if subject.trim().is_empty() {
            return Err(AdminError::Usage("subject <new group name>".to_string()));
        }
        self.session.group_set_subject(group_id, subject).await?;
        Ok(CommandOutcome::Reply("Group subject updated.".to_string()))
    }

    pub async fn set_description(&self, group_id: &str, sender: &CanonicalId, description: &str) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.session.group_set_description(group_id, description).await?;
        Ok(CommandOutcome::Reply("Group description updated.".to_string()))
    }

    pub async fn leave(&self, group_id: &str, sender: &CanonicalId) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.session.group_leave(group_id).await?;
        Ok(CommandOutcome::Reply("Left the group.".to_string()))
    }

    pub async fn invite_code(&self, group_id: &str, sender: &CanonicalId) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        let code = self.session.group_invite_code(group_id).await?;
        Ok(CommandOutcome::Reply(format!("https://chat.whatsapp.com/{code}")))
    }

    pub async fn revoke_invite(&self, group_id: &str, sender: &CanonicalId) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        let code = self.session.group_revoke_invite(group_id).await?;
        Ok(CommandOutcome::Reply(format!(
            "Invite link reset: https://chat.whatsapp.com/{code}"
        )))
    }

    /// Unlike the other operations, accepting an invite has no existing
    /// group to resolve admin rights against, so any sender may invoke it.
    pub async fn accept_invite(&self, code: &str) -> Result<CommandOutcome> {
        let group_id = self.session.group_accept_invite(code).await?;
        Ok(CommandOutcome::Reply(format!("Joined group {group_id}.")))
    }

    pub async fn info_from_invite(&self, code: &str) -> Result<CommandOutcome> {
        let info = self.session.group_info_from_invite(code).await?;
        let subject = info.get("subject").and_then(|v| v.as_str()).unwrap_or("unknown");
        Ok(CommandOutcome::Reply(format!("Group: {subject}")))
    }

    pub async fn metadata(&self, group_id: &str) -> Result<CommandOutcome> {
        let meta = self.groups.get_or_fetch(group_id, self.session.as_ref()).await?;
        Ok(CommandOutcome::Reply(format!(
            "{} — {} participant(s)",
            meta.subject,
            meta.participant_count()
        )))
    }

    pub async fn join_requests_list(&self, group_id: &str, sender: &CanonicalId) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        let pending = self.session.group_join_requests(group_id).await?;
        if pending.is_empty() {
            return Ok(CommandOutcome::Reply("No pending join requests.".to_string()));
        }
        Ok(CommandOutcome::Reply(format!(
            "{} pending request(s): {}",
            pending.len(),
            pending.join(", ")
        )))
    }

    pub async fn join_requests_update(
        &self,
        group_id: &str,
        sender: &CanonicalId,
        participant_ids: &[String],
        action: JoinRequestAction,
    ) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.session
            .group_update_join_requests(group_id, participant_ids, action)
            .await?;
        let verb = match action {
            JoinRequestAction::Approve => "Approved",
            JoinRequestAction::Reject => "Rejected",
        };
        Ok(CommandOutcome::Reply(format!("{verb} {} request(s).", participant_ids.len())))
    }

    pub async fn set_ephemeral(
        &self,
        group_id: &str,
        sender: &CanonicalId,
        duration_secs: Option<u64>,
    ) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.session.group_set_ephemeral(group_id, duration_secs).await?;
        let reply = match duration_secs {
            Some(secs) => format!("Disappearing messages set to {secs}s."),
            None => "Disappearing messages disabled.".to_string(),
        };
        Ok(CommandOutcome::Reply(reply))
    }

    pub async fn set_member_add_mode(
        &self,
        group_id: &str,
        sender: &CanonicalId,
        mode: MemberAddMode,
    ) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.session.group_set_member_add_mode(group_id, mode).await?;
        let reply = match mode {
            MemberAddMode::AllParticipants => "Any participant may now add members.",
            MemberAddMode::AdminsOnly => "Only admins may now add members.",
        };
        Ok(CommandOutcome::Reply(reply.to_string()))
    }

    // ---- per-group config toggles --------------------------------------

    pub async fn set_welcome(
        &self,
        group_id: &str,
        sender: &CanonicalId,
        enabled: bool,
        template: Option<String>,
    ) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.config_store
            .patch(
                group_id,
                GroupConfigPatch {
                    welcome_enabled: Some(enabled),
                    welcome_template: template,
                    ..Default::default()
                },
            )
            .await?;
        Ok(CommandOutcome::Reply(format!(
            "Welcome messages {}.",
            if enabled { "enabled" } else { "disabled" }
        )))
    }

    pub async fn set_farewell(
        &self,
        group_id: &str,
        sender: &CanonicalId,
        enabled: bool,
        template: Option<String>,
    ) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.config_store
            .patch(
                group_id,
                GroupConfigPatch {
                    farewell_enabled: Some(enabled),
                    farewell_template: template,
                    ..Default::default()
                },
            )
            .await?;
        Ok(CommandOutcome::Reply(format!(
            "Farewell messages {}.",
            if enabled { "enabled" } else { "disabled" }
        )))
    }

    pub async fn set_anti_link(&self, group_id: &str, sender: &CanonicalId, enabled: bool) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.config_store
            .patch(
                group_id,
                GroupConfigPatch {
                    anti_link_enabled: Some(enabled),
                    ..Default::default()
                },
            )
            .await?;
        Ok(CommandOutcome::Reply(format!(
            "Anti-link {}.",
            if enabled { "enabled" } else { "disabled" }
        )))
    }

    pub async fn anti_link_list(&self, group_id: &str) -> Result<CommandOutcome> {
        let config = self.config_store.get(group_id).await?;
        if config.allowed_networks.is_empty() && config.allowed_domains.is_empty() {
            return Ok(CommandOutcome::Reply("No allowed networks or domains configured.".to_string()));
        }
        Ok(CommandOutcome::Reply(format!(
            "Allowed networks: {:?}\nAllowed domains: {:?}",
            config.allowed_networks, config.allowed_domains
        )))
    }

    pub async fn anti_link_allow(&self, group_id: &str, sender: &CanonicalId, domain: &str) -> Result<CommandOutcome> {
        self.mutate_allowed_domains(group_id, sender, domain, true).await
    }

    pub async fn anti_link_disallow(&self, group_id: &str, sender: &CanonicalId, domain: &str) -> Result<CommandOutcome> {
        self.mutate_allowed_domains(group_id, sender, domain, false).await
    }

    /// `allow`/`disallow` are aliases for `add`/`remove` against the same
    /// allowlist — the dispatcher maps both command spellings here.
    async fn mutate_allowed_domains(
        &self,
        group_id: &str,
        sender: &CanonicalId,
        domain: &str,
        allow: bool,
    ) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        let mut config = self.config_store.get(group_id).await?;
        if allow {
            config.allowed_domains.insert(domain.to_ascii_lowercase());
        } else {
            config.allowed_domains.remove(&domain.to_ascii_lowercase());
        }
        self.config_store
            .patch(
                group_id,
                GroupConfigPatch {
                    allowed_domains: Some(config.allowed_domains),
                    ..Default::default()
                },
            )
            .await?;
        Ok(CommandOutcome::Reply(format!(
            "{domain} {}.",
            if allow { "allowed" } else { "no longer allowed" }
        )))
    }

    // ---- owner-only ------------------------------------------------------

    pub async fn premium_add(&self, sender: &CanonicalId, target: &str) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_owner(sender) {
            return Ok(denied);
        }
        self.config_store.add_premium_user(target).await?;
        Ok(CommandOutcome::Reply(format!("{target} is now premium.")))
    }

    pub async fn premium_remove(&self, sender: &CanonicalId, target: &str) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_owner(sender) {
            return Ok(denied);
        }
        self.config_store.remove_premium_user(target).await?;
        Ok(CommandOutcome::Reply(format!("{target} is no longer premium.")))
    }

    pub async fn premium_list(&self, sender: &CanonicalId) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_owner(sender) {
            return Ok(denied);
        }
        let users = self.config_store.premium_users().await?;
        if users.is_empty() {
            return Ok(CommandOutcome::Reply("No premium users.".to_string()));
        }
        Ok(CommandOutcome::Reply(users.into_iter().collect::<Vec<_>>().join(", ")))
    }

    // ---- news / prefix / nsfw --------------------------------------------

    pub async fn set_news(&self, group_id: &str, sender: &CanonicalId, enabled: bool) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.config_store
            .patch(
                group_id,
                GroupConfigPatch {
                    news_enabled: Some(enabled),
                    ..Default::default()
                },
            )
            .await?;
        Ok(CommandOutcome::Reply(format!("News broadcasts {}.", if enabled { "enabled" } else { "disabled" })))
    }

    pub async fn news_status(&self, group_id: &str) -> Result<CommandOutcome> {
        let config = self.config_store.get(group_id).await?;
        Ok(CommandOutcome::Reply(format!(
            "News broadcasts are {}.",
            if config.news_enabled { "on" } else { "off" }
        )))
    }

    pub async fn set_prefix(&self, group_id: &str, sender: &CanonicalId, prefix: &str) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        if prefix.is_empty() || prefix.len() > 3 {
            return Err(AdminError::Usage("prefix set <1-3 character symbol>".to_string()));
        }
        self.config_store
            .patch(
                group_id,
                GroupConfigPatch {
                    command_prefix: Some(prefix.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(CommandOutcome::Reply(format!("Command prefix set to \"{prefix}\".")))
    }

    pub async fn prefix_status(&self, group_id: &str, default_prefix: &str) -> Result<CommandOutcome> {
        let config = self.config_store.get(group_id).await?;
        let prefix = config.command_prefix.as_deref().unwrap_or(default_prefix);
        Ok(CommandOutcome::Reply(format!("Current prefix: \"{prefix}\"")))
    }

    pub async fn prefix_reset(&self, group_id: &str, sender: &CanonicalId) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.config_store.reset_prefix(group_id).await?;
        Ok(CommandOutcome::Reply("Command prefix reset to the default.".to_string()))
    }

    pub async fn set_nsfw(&self, group_id: &str, sender: &CanonicalId, enabled: bool) -> Result<CommandOutcome> {
        if let Some(denied) = self.require_group_admin(group_id, sender).await {
            return Ok(denied);
        }
        self.config_store
            .patch(
                group_id,
                GroupConfigPatch {
                    nsfw_enabled: Some(enabled),
                    ..Default::default()
                },
            )
            .await?;
        Ok(CommandOutcome::Reply(format!("NSFW content {}.", if enabled { "allowed" } else { "blocked" })))
    }

    pub async fn nsfw_status(&self, group_id: &str) -> Result<CommandOutcome> {
        let config = self.config_store.get(group_id).await?;
        Ok(CommandOutcome::Reply(format!(
            "NSFW content is {}.",
            if config.nsfw_enabled { "allowed" } else { "blocked" }
        )))
    }
}
