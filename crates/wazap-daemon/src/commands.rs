//! Builds the `CommandRegistry` the dispatcher consults for every
//! recognized command: one closure per `wazap-admin` operation, plus a
//! baseline menu/ping pair and an owner-gated broadcast trigger (spec
//! §4.H, §4.L).

use std::sync::Arc;

use wazap_admin::{AdminCommands, CommandOutcome};
use wazap_broadcast::{BroadcastEngine, BroadcastMode};
use wazap_cache::CacheTier;
use wazap_core::types::CanonicalId;
use wazap_dispatch::{CommandContext, CommandHandler, CommandRegistry};
use wazap_sdk::session::{JoinRequestAction, MemberAddMode};
use wazap_storage::Gateway;

fn outcome_text(outcome: CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Reply(text) => text,
        CommandOutcome::Denied(reason) => reason,
    }
}

fn sender(ctx: &CommandContext) -> CanonicalId {
    CanonicalId::from(ctx.sender_id.clone())
}

fn targets(ctx: &CommandContext) -> Vec<CanonicalId> {
    ctx.args
        .iter()
        .map(|a| CanonicalId::from(a.trim_start_matches('@').to_string()))
        .collect()
}

fn usage(cmd: &str, args: &str) -> anyhow::Error {
    anyhow::anyhow!("usage: {cmd} {args}")
}

pub fn build_registry(
    admin: Arc<AdminCommands>,
    broadcast: Arc<BroadcastEngine>,
    gateway: Arc<Gateway>,
    cache: Arc<CacheTier>,
    owner_id: Option<String>,
) -> CommandRegistry {
    let mut registry = CommandRegistry::new();

    macro_rules! register {
        ($name:expr, $handler:expr) => {
            registry.register($name, Arc::new($handler) as CommandHandler);
        };
    }

    register!("menu", |_ctx: CommandContext| {
        Box::pin(async move {
            Ok(Some(
                "Commands: add, remove, promote, demote, subject, description, leave, \
                 invitecode, revokeinvite, acceptinvite, groupinfo, joinrequests, ephemeral, \
                 memberaddmode, welcome, farewell, antilink, premium, news, prefix, nsfw, \
                 broadcast, ping"
                    .to_string(),
            ))
        })
    });

    register!("ping", |_ctx: CommandContext| {
        Box::pin(async move { Ok(Some("pong".to_string())) })
    });

    register!("recents", {
        let cache = cache.clone();
        move |ctx: CommandContext| {
            let cache = cache.clone();
            Box::pin(async move {
                let recents = cache.recents(&ctx.chat_id).await;
                if recents.is_empty() {
                    return Ok(Some("No recent messages cached for this chat.".to_string()));
                }
                Ok(Some(format!("{} recent message(s) cached.", recents.len())))
            })
        }
    });

    register!("add", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let t = targets(&ctx);
                if t.is_empty() {
                    return Err(usage("add", "<id> [id...]"));
                }
                let outcome = admin.add(&ctx.chat_id, &sender(&ctx), &t).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("remove", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let t = targets(&ctx);
                if t.is_empty() {
                    return Err(usage("remove", "<id> [id...]"));
                }
                let outcome = admin.remove(&ctx.chat_id, &sender(&ctx), &t).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("promote", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let t = targets(&ctx);
                if t.is_empty() {
                    return Err(usage("promote", "<id> [id...]"));
                }
                let outcome = admin.promote(&ctx.chat_id, &sender(&ctx), &t).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("demote", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let t = targets(&ctx);
                if t.is_empty() {
                    return Err(usage("demote", "<id> [id...]"));
                }
                let outcome = admin.demote(&ctx.chat_id, &sender(&ctx), &t).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("subject", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let subject = ctx.args.join(" ");
                let outcome = admin.set_subject(&ctx.chat_id, &sender(&ctx), &subject).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("description", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let description = ctx.args.join(" ");
                let outcome = admin.set_description(&ctx.chat_id, &sender(&ctx), &description).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("leave", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let outcome = admin.leave(&ctx.chat_id, &sender(&ctx)).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("invitecode", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let outcome = admin.invite_code(&ctx.chat_id, &sender(&ctx)).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("revokeinvite", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let outcome = admin.revoke_invite(&ctx.chat_id, &sender(&ctx)).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("acceptinvite", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let Some(code) = ctx.args.first() else {
                    return Err(usage("acceptinvite", "<code>"));
                };
                let outcome = admin.accept_invite(code).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("groupinfo", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                match ctx.args.first() {
                    Some(code) => {
                        let outcome = admin.info_from_invite(code).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    None => {
                        let outcome = admin.metadata(&ctx.chat_id).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                }
            })
        }
    });

    register!("joinrequests", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                match ctx.args.first().map(String::as_str) {
                    None | Some("list") => {
                        let outcome = admin.join_requests_list(&ctx.chat_id, &sender(&ctx)).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some(verb @ ("approve" | "reject")) => {
                        let action = if verb == "approve" {
                            JoinRequestAction::Approve
                        } else {
                            JoinRequestAction::Reject
                        };
                        let ids: Vec<String> = ctx.args[1..].to_vec();
                        if ids.is_empty() {
                            return Err(usage("joinrequests approve|reject", "<id> [id...]"));
                        }
                        let outcome = admin
                            .join_requests_update(&ctx.chat_id, &sender(&ctx), &ids, action)
                            .await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some(_) => Err(usage("joinrequests", "list|approve|reject [ids...]")),
                }
            })
        }
    });

    register!("ephemeral", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let secs = match ctx.args.first().map(String::as_str) {
                    None | Some("off") => None,
                    Some(n) => Some(n.parse::<u64>().map_err(|_| usage("ephemeral", "<seconds>|off"))?),
                };
                let outcome = admin.set_ephemeral(&ctx.chat_id, &sender(&ctx), secs).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("memberaddmode", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let mode = match ctx.args.first().map(String::as_str) {
                    Some("all") => MemberAddMode::AllParticipants,
                    Some("admins") => MemberAddMode::AdminsOnly,
                    _ => return Err(usage("memberaddmode", "all|admins")),
                };
                let outcome = admin.set_member_add_mode(&ctx.chat_id, &sender(&ctx), mode).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("welcome", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let enabled = !matches!(ctx.args.first().map(String::as_str), Some("off"));
                let template = if ctx.args.len() > 1 {
                    Some(ctx.args[1..].join(" "))
                } else {
                    None
                };
                let outcome = admin.set_welcome(&ctx.chat_id, &sender(&ctx), enabled, template).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("farewell", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                let enabled = !matches!(ctx.args.first().map(String::as_str), Some("off"));
                let template = if ctx.args.len() > 1 {
                    Some(ctx.args[1..].join(" "))
                } else {
                    None
                };
                let outcome = admin.set_farewell(&ctx.chat_id, &sender(&ctx), enabled, template).await?;
                Ok(Some(outcome_text(outcome)))
            })
        }
    });

    register!("antilink", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                match ctx.args.first().map(String::as_str) {
                    Some("on") => {
                        let outcome = admin.set_anti_link(&ctx.chat_id, &sender(&ctx), true).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("off") => {
                        let outcome = admin.set_anti_link(&ctx.chat_id, &sender(&ctx), false).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("list") | None => {
                        let outcome = admin.anti_link_list(&ctx.chat_id).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("allow") => {
                        let Some(domain) = ctx.args.get(1) else {
                            return Err(usage("antilink allow", "<domain>"));
                        };
                        let outcome = admin.anti_link_allow(&ctx.chat_id, &sender(&ctx), domain).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("disallow") => {
                        let Some(domain) = ctx.args.get(1) else {
                            return Err(usage("antilink disallow", "<domain>"));
                        };
                        let outcome = admin.anti_link_disallow(&ctx.chat_id, &sender(&ctx), domain).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some(_) => Err(usage("antilink", "on|off|list|allow|disallow")),
                }
            })
        }
    });

    register!("premium", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                match ctx.args.first().map(String::as_str) {
                    Some("add") => {
                        let Some(target) = ctx.args.get(1) else {
                            return Err(usage("premium add", "<id>"));
                        };
                        let outcome = admin.premium_add(&sender(&ctx), target).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("remove") => {
                        let Some(target) = ctx.args.get(1) else {
                            return Err(usage("premium remove", "<id>"));
                        };
                        let outcome = admin.premium_remove(&sender(&ctx), target).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("list") | None => {
                        let outcome = admin.premium_list(&sender(&ctx)).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some(_) => Err(usage("premium", "add|remove|list")),
                }
            })
        }
    });

    register!("news", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                match ctx.args.first().map(String::as_str) {
                    Some("on") => {
                        let outcome = admin.set_news(&ctx.chat_id, &sender(&ctx), true).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("off") => {
                        let outcome = admin.set_news(&ctx.chat_id, &sender(&ctx), false).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("status") | None => {
                        let outcome = admin.news_status(&ctx.chat_id).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some(_) => Err(usage("news", "on|off|status")),
                }
            })
        }
    });

    register!("prefix", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                match ctx.args.first().map(String::as_str) {
                    Some("set") => {
                        let Some(prefix) = ctx.args.get(1) else {
                            return Err(usage("prefix set", "<symbol>"));
                        };
                        let outcome = admin.set_prefix(&ctx.chat_id, &sender(&ctx), prefix).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("reset") => {
                        let outcome = admin.prefix_reset(&ctx.chat_id, &sender(&ctx)).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("status") | None => {
                        let outcome = admin
                            .prefix_status(&ctx.chat_id, wazap_core::config::DEFAULT_COMMAND_PREFIX)
                            .await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some(_) => Err(usage("prefix", "set <symbol>|status|reset")),
                }
            })
        }
    });

    register!("nsfw", {
        let admin = admin.clone();
        move |ctx: CommandContext| {
            let admin = admin.clone();
            Box::pin(async move {
                match ctx.args.first().map(String::as_str) {
                    Some("on") => {
                        let outcome = admin.set_nsfw(&ctx.chat_id, &sender(&ctx), true).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("off") => {
                        let outcome = admin.set_nsfw(&ctx.chat_id, &sender(&ctx), false).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some("status") | None => {
                        let outcome = admin.nsfw_status(&ctx.chat_id).await?;
                        Ok(Some(outcome_text(outcome)))
                    }
                    Some(_) => Err(usage("nsfw", "on|off|status")),
                }
            })
        }
    });

    register!("broadcast", {
        let broadcast = broadcast.clone();
        let gateway = gateway.clone();
        let owner_id = owner_id.clone();
        move |ctx: CommandContext| {
            let broadcast = broadcast.clone();
            let gateway = gateway.clone();
            let owner_id = owner_id.clone();
            Box::pin(async move {
                if owner_id.as_deref() != Some(ctx.sender_id.as_str()) {
                    return Ok(Some("Only the bot owner may trigger a broadcast.".to_string()));
                }
                if ctx.args.is_empty() {
                    return Err(usage("broadcast", "<message text>"));
                }
                let text = ctx.args.join(" ");
                let group_ids = gateway.list_group_chat_ids().await?;
                let report = broadcast
                    .broadcast(group_ids, serde_json::json!({"text": text}), BroadcastMode::Default)
                    .await;
                Ok(Some(format!(
                    "Broadcast done: {}/{} succeeded, {} rate-limit hit(s).",
                    report.succeeded, report.total, report.rate_limit_hits
                )))
            })
        }
    });

    registry
}
