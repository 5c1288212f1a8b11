//! Resolves the command prefix per chat, extracts command+args, reacts on
//! recognized commands, and invokes the registered handler — the
//! `messages.upsert` entry point wired into the event router.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, warn};
use wazap_admin::antilink;
use wazap_core::types::{CanonicalId, IdentitySource};
use wazap_groups::GroupMetadataService;
use wazap_identity::IdentityResolver;
use wazap_queue::ops::insert_message_op;
use wazap_queue::WriteQueueHandle;
use wazap_sdk::session::ParticipantAction;
use wazap_sdk::Session;

use crate::error::Result;
use crate::parse::{extract_messages, has_sticker_eligible_media, InboundMessage};
use crate::registry::{CommandContext, CommandHandler, CommandRegistry};
use crate::send::{SendFacility, SendOptions};

pub struct DispatcherConfig {
    pub default_command_prefix: String,
    pub react_emoji: String,
    pub start_login_trigger: String,
    pub auto_sticker_enabled: bool,
    pub unknown_command_reply: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_command_prefix: wazap_core::config::DEFAULT_COMMAND_PREFIX.to_string(),
            react_emoji: wazap_core::config::DEFAULT_REACT_EMOJI.to_string(),
            start_login_trigger: wazap_core::config::DEFAULT_START_LOGIN_TRIGGER.to_string(),
            auto_sticker_enabled: false,
            unknown_command_reply: "Unknown command. Send \"menu\" to see what I can do.".to_string(),
        }
    }
}

pub struct Dispatcher {
    session: Arc<dyn Session>,
    queue: WriteQueueHandle,
    identity: Arc<IdentityResolver>,
    groups: Arc<GroupMetadataService>,
    group_configs: Arc<wazap_admin::GroupConfigStore>,
    send: Arc<SendFacility>,
    registry: CommandRegistry,
    sticker_handler: Option<CommandHandler>,
    bot_id: CanonicalId,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        session: Arc<dyn Session>,
        queue: WriteQueueHandle,
        identity: Arc<IdentityResolver>,
        groups: Arc<GroupMetadataService>,
        group_configs: Arc<wazap_admin::GroupConfigStore>,
        send: Arc<SendFacility>,
        registry: CommandRegistry,
        bot_id: CanonicalId,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            session,
            queue,
            identity,
            groups,
            group_configs,
            send,
            registry,
            sticker_handler: None,
            bot_id,
            config,
        }
    }

    pub fn set_sticker_handler(&mut self, handler: CommandHandler) {
        self.sticker_handler = Some(handler);
    }

    fn is_group(chat_id: &str) -> bool {
        chat_id.ends_with("@g.us")
    }

    /// The registered `messages.upsert` handler: resolves identity and
    /// persists every message in the batch, then runs the command pipeline
    /// for each one. One message's failure never aborts the batch.
    pub async fn handle_messages_upsert(&self, raw: serde_json::Value) -> Result<()> {
        for message in extract_messages(&raw) {
            let sender = self.resolve_sender(&message).await;
            self.persist(&message, &sender);

            if message.from_me {
                continue;
            }
            if let Err(e) = self.run_pipeline(message, sender).await {
                error!(error = %e, "dispatcher pipeline failed for inbound message");
            }
        }
        Ok(())
    }

    async fn resolve_sender(&self, message: &InboundMessage) -> CanonicalId {
        match &message.sender_alt_jid {
            Some(jid) => self
                .identity
                .resolve(&message.sender_lid, Some(jid), IdentitySource::Message)
                .await
                .unwrap_or_else(|_| CanonicalId::from(message.sender_lid.clone())),
            None => self
                .identity
                .resolve(&message.sender_lid, None, IdentitySource::Message)
                .await
                .unwrap_or_else(|_| CanonicalId::from(message.sender_lid.clone())),
        }
    }

    fn persist(&self, message: &InboundMessage, sender: &CanonicalId) {
        let op = insert_message_op(
            message.chat_id.clone(),
            message.message_id.clone(),
            sender.as_str().to_string(),
            message.content.clone(),
            message.raw.clone(),
            message.timestamp,
        );
        if let Err(e) = self.queue.try_enqueue(op) {
            warn!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                error = %e,
                "inbound message persistence dropped"
            );
        }
    }

    async fn run_pipeline(&self, message: InboundMessage, sender: CanonicalId) -> Result<()> {
        let is_group = Self::is_group(&message.chat_id);

        // Step 2: resolve the chat's configured command prefix.
        let prefix = if is_group {
            self.group_configs
                .get(&message.chat_id)
                .await?
                .command_prefix
                .unwrap_or_else(|| self.config.default_command_prefix.clone())
        } else {
            self.config.default_command_prefix.clone()
        };

        // Step 3: anti-link policy for groups.
        if is_group && self.apply_anti_link_policy(&message, &sender).await? {
            return Ok(());
        }

        // Step 4: start-login trigger.
        if message.content.trim().eq_ignore_ascii_case(&self.config.start_login_trigger) {
            self.handle_start_login(&message, &sender, is_group).await?;
            return Ok(());
        }

        // Step 5/6/7: command prefix recognition, else auto-sticker fallback.
        if let Some(rest) = message.content.strip_prefix(prefix.as_str()) {
            self.react_best_effort(&message).await;
            let mut parts = rest.trim().split_whitespace();
            let command = parts.next().unwrap_or_default().to_lowercase();
            let args: Vec<String> = parts.map(str::to_string).collect();

            if command.is_empty() {
                return Ok(());
            }

            match self.registry.get(&command) {
                Some(handler) => {
                    let reply_chat = message.chat_id.clone();
                    let ctx = CommandContext {
                        chat_id: message.chat_id.clone(),
                        sender_id: sender.as_str().to_string(),
                        is_group,
                        command: command.clone(),
                        args,
                        message,
                    };
                    // Step 8: capture handler errors, never propagate.
                    match handler(ctx).await {
                        Ok(Some(reply)) => {
                            self.send.send_and_store(&reply_chat, json!({"text": reply}), SendOptions::default()).await?;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!(command, error = %e, "command handler failed");
                        }
                    }
                }
                None => {
                    self.send
                        .send_and_store(&message.chat_id, json!({"text": self.config.unknown_command_reply}), SendOptions::default())
                        .await?;
                }
            }
            return Ok(());
        }

        if is_group && self.config.auto_sticker_enabled && has_sticker_eligible_media(&message.raw) {
            if let Some(handler) = &self.sticker_handler {
                let ctx = CommandContext {
                    chat_id: message.chat_id.clone(),
                    sender_id: sender.as_str().to_string(),
                    is_group,
                    command: "__sticker__".to_string(),
                    args: Vec::new(),
                    message,
                };
                if let Err(e) = handler(ctx).await {
                    error!(error = %e, "auto-sticker handler failed");
                }
            }
        }

        Ok(())
    }

    async fn react_best_effort(&self, message: &InboundMessage) {
        if let Err(e) = self
            .session
            .react(&message.chat_id, &message.message_id, &self.config.react_emoji)
            .await
        {
            warn!(error = %e, "best-effort command-acknowledgement reaction failed");
        }
    }

    async fn handle_start_login(&self, message: &InboundMessage, sender: &CanonicalId, is_group: bool) -> Result<()> {
        if is_group {
            self.send
                .send_and_store(
                    &message.chat_id,
                    json!({"text": "Please message me privately to continue."}),
                    SendOptions::default(),
                )
                .await?;
            return Ok(());
        }
        let login_link = format!("https://wa.me/me?uid={}", sender.as_str());
        self.send
            .send_and_store(&message.chat_id, json!({"text": format!("Continue here: {login_link}")}), SendOptions::default())
            .await?;
        Ok(())
    }

    /// Returns `true` when the policy handled the message itself (removal
    /// or notice posted) and the pipeline should stop.
    async fn apply_anti_link_policy(&self, message: &InboundMessage, sender: &CanonicalId) -> Result<bool> {
        if sender == &self.bot_id {
            return Ok(false);
        }
        let config = self.group_configs.get(&message.chat_id).await?;
        if !config.anti_link_enabled {
            return Ok(false);
        }
        let Some(link_match) = antilink::detect(&message.content, &config.allowed_networks, &config.allowed_domains) else {
            return Ok(false);
        };

        let meta = self.groups.get_or_fetch(&message.chat_id, self.session.as_ref()).await?;
        let sender_is_admin = meta
            .participants
            .iter()
            .find(|p| &p.id == sender)
            .map(|p| p.role.is_admin())
            .unwrap_or(false);

        if sender_is_admin {
            self.send
                .send_and_store(
                    &message.chat_id,
                    json!({"text": format!("Link policy: {sender} posted a link ({}), but is exempt as an admin.", link_match.matched_text)}),
                    SendOptions::default(),
                )
                .await?;
            return Ok(true);
        }

        if let Err(e) = self
            .session
            .group_update_participants(&message.chat_id, &[sender.as_str().to_string()], ParticipantAction::Remove)
            .await
        {
            warn!(error = %e, "anti-link removal failed");
        }
        if let Err(e) = self.session.delete_message(&message.chat_id, &message.message_id).await {
            warn!(error = %e, "anti-link message deletion failed");
        }
        self.send
            .send_and_store(
                &message.chat_id,
                json!({"text": format!("{sender} was removed for posting a link.")}),
                SendOptions::default(),
            )
            .await?;
        Ok(true)
    }
}
