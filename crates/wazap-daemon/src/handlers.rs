//! Registers one handler per event kind the connection supervisor forwards
//! to the router (spec §4.F). `connection-open` / `connection-close` /
//! `connection-qr` are handled directly by the supervisor's own run loop
//! and never reach the router, so they have no entry here.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::Value as Json;
use tracing::{debug, warn};

use wazap_cache::CacheTier;
use wazap_connection::EventRouter;
use wazap_core::types::{AdminRole, CanonicalId, IdentitySource};
use wazap_dispatch::Dispatcher;
use wazap_groups::GroupMetadataService;
use wazap_identity::IdentityResolver;
use wazap_queue::ops::WriteOp;
use wazap_queue::WriteQueueHandle;
use wazap_sdk::auth::{AuthStore, Credentials};
use wazap_sdk::event::SdkEvent;
use wazap_sdk::Session;
use wazap_storage::gateway::ChatRow;

/// Everything a handler needs, cloned cheaply (every field is an `Arc` or a
/// handle) into each registered closure.
#[derive(Clone)]
pub struct HandlerContext {
    pub queue: WriteQueueHandle,
    pub identity: Arc<IdentityResolver>,
    pub groups: Arc<GroupMetadataService>,
    pub dispatcher: Arc<Dispatcher>,
    pub auth: Arc<dyn AuthStore>,
    pub session: Arc<dyn Session>,
    pub cache: Arc<CacheTier>,
}

pub fn register_all(router: &mut EventRouter, ctx: HandlerContext) {
    router.register("credential-update", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| credential_update(ctx.clone(), raw))
        })
    });

    router.register("messages.upsert", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| async move {
                for message in wazap_dispatch::parse::extract_messages(&raw) {
                    ctx.cache.push_recent(&message.chat_id, message.raw.clone()).await;
                }
                ctx.dispatcher.handle_messages_upsert(raw).await?;
                Ok(())
            })
        })
    });

    router.register("messages.update", Arc::new(|event| {
        Box::pin(async move {
            debug!(kind = event.kind(), "poll-vote / message-update event (leaf feature, logged only)");
            Ok(())
        })
    }));

    router.register("messages.reaction", Arc::new(|event| {
        Box::pin(async move {
            debug!(kind = event.kind(), "reaction event (captcha-style verification is leaf feature, logged only)");
            Ok(())
        })
    }));

    router.register("groups.upsert", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| groups_ingest(ctx.clone(), raw))
        })
    });

    router.register("groups.update", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| groups_ingest(ctx.clone(), raw))
        })
    });

    router.register("group-participants.update", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| group_participants_update(ctx.clone(), raw))
        })
    });

    router.register("group.join-request", Arc::new(|event| {
        Box::pin(async move {
            debug!(kind = event.kind(), "join request received, awaiting an admin's `joinrequests` command");
            Ok(())
        })
    }));

    router.register("chats.upsert", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| chats_upsert(ctx.clone(), raw, false))
        })
    });

    router.register("chats.update", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| chats_upsert(ctx.clone(), raw, true))
        })
    });

    router.register("chats.delete", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| chats_delete(ctx.clone(), raw))
        })
    });

    router.register("contacts.upsert", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| seed_identity(ctx.clone(), raw, "contacts"))
        })
    });

    router.register("contacts.update", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| seed_identity(ctx.clone(), raw, "contacts"))
        })
    });

    router.register("lid-mapping.update", {
        let ctx = ctx.clone();
        Arc::new(move |event| {
            let ctx = ctx.clone();
            handle(event, move |raw| seed_identity(ctx.clone(), raw, "lid-mapping"))
        })
    });

    router.register("presence.update", Arc::new(|event| {
        Box::pin(async move {
            debug!(kind = event.kind(), "presence event, logged only");
            Ok(())
        })
    }));

    router.register("blocklist", Arc::new(|event| {
        Box::pin(async move {
            debug!(kind = event.kind(), "blocklist event, logged only");
            Ok(())
        })
    }));

    router.register("call", Arc::new(|event| {
        Box::pin(async move {
            debug!(kind = event.kind(), "call event, logged only");
            Ok(())
        })
    }));

    router.register("newsletter", Arc::new(|event| {
        Box::pin(async move {
            debug!(kind = event.kind(), "newsletter event, logged only");
            Ok(())
        })
    }));
}

/// Extracts the raw `Json` payload carried by the subset of `SdkEvent`
/// variants this crate registers handlers for, then hands it to `f`.
/// Variants with no payload (the three connection-lifecycle ones) never
/// reach here, since the supervisor intercepts them before dispatch.
fn handle<F, Fut>(event: SdkEvent, f: F) -> BoxFuture<'static, anyhow::Result<()>>
where
    F: FnOnce(Json) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::pin(async move {
        let raw = match event {
            SdkEvent::CredentialUpdate(raw)
            | SdkEvent::MessagesUpsert(raw)
            | SdkEvent::MessagesUpdate(raw)
            | SdkEvent::MessagesReaction(raw)
            | SdkEvent::GroupsUpsert(raw)
            | SdkEvent::GroupsUpdate(raw)
            | SdkEvent::GroupParticipantsUpdate(raw)
            | SdkEvent::GroupJoinRequest(raw)
            | SdkEvent::ChatsUpsert(raw)
            | SdkEvent::ChatsUpdate(raw)
            | SdkEvent::ChatsDelete(raw)
            | SdkEvent::ContactsUpsert(raw)
            | SdkEvent::ContactsUpdate(raw)
            | SdkEvent::LidMappingUpdate(raw)
            | SdkEvent::PresenceUpdate(raw)
            | SdkEvent::Blocklist(raw)
            | SdkEvent::Call(raw)
            | SdkEvent::Newsletter(raw) => raw,
            SdkEvent::ConnectionOpen | SdkEvent::ConnectionClose { .. } | SdkEvent::ConnectionQr { .. } => {
                return Ok(());
            }
        };
        f(raw).await
    })
}

async fn credential_update(ctx: HandlerContext, raw: Json) -> anyhow::Result<()> {
    let files = raw
        .as_object()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .collect();
    ctx.auth.save(&Credentials { files })?;
    Ok(())
}

async fn groups_ingest(ctx: HandlerContext, raw: Json) -> anyhow::Result<()> {
    let Some(group_id) = raw.get("id").and_then(Json::as_str) else {
        warn!("groups.upsert/update payload missing id, dropped");
        return Ok(());
    };
    ctx.groups.ingest(group_id, &raw).await?;
    Ok(())
}

async fn group_participants_update(ctx: HandlerContext, raw: Json) -> anyhow::Result<()> {
    let Some(group_id) = raw.get("id").and_then(Json::as_str).map(str::to_string) else {
        warn!("group-participants.update payload missing id, dropped");
        return Ok(());
    };
    let action = raw.get("action").and_then(Json::as_str).unwrap_or("");
    let ids: Vec<CanonicalId> = raw
        .get("participants")
        .and_then(Json::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Json::as_str)
                .map(CanonicalId::from)
                .collect()
        })
        .unwrap_or_default();

    let added: Vec<(CanonicalId, AdminRole)> = match action {
        "add" => ids.iter().cloned().map(|id| (id, AdminRole::Member)).collect(),
        _ => Vec::new(),
    };
    let removed: Vec<CanonicalId> = match action {
        "remove" => ids.clone(),
        _ => Vec::new(),
    };
    let role_changed: Vec<(CanonicalId, AdminRole)> = match action {
        "promote" => ids.iter().cloned().map(|id| (id, AdminRole::Admin)).collect(),
        "demote" => ids.iter().cloned().map(|id| (id, AdminRole::Member)).collect(),
        _ => Vec::new(),
    };

    let updated = ctx
        .groups
        .apply_participants_update(&group_id, &added, &removed, &role_changed)
        .await?;

    if updated.is_none() {
        // Nothing cached to diff against yet — fall back to a full fetch.
        if let Err(e) = ctx.groups.get_or_fetch(&group_id, ctx.session.as_ref()).await {
            warn!(group_id, error = %e, "group-participants.update fallback fetch failed");
        }
    }
    Ok(())
}

async fn chats_upsert(ctx: HandlerContext, raw: Json, partial: bool) -> anyhow::Result<()> {
    let Some(id) = raw.get("id").and_then(Json::as_str).map(str::to_string) else {
        warn!("chats.upsert/update payload missing id, dropped");
        return Ok(());
    };
    let name = raw
        .get("name")
        .or_else(|| raw.get("subject"))
        .and_then(Json::as_str)
        .map(str::to_string);
    let force_name = name.is_some();
    let row = ChatRow {
        id,
        name,
        raw_chat: raw,
        updated_at: Utc::now(),
    };
    ctx.queue.try_enqueue(WriteOp::UpsertChat { row, partial, force_name })?;
    Ok(())
}

async fn chats_delete(ctx: HandlerContext, raw: Json) -> anyhow::Result<()> {
    let Some(id) = raw.get("id").and_then(Json::as_str).map(str::to_string) else {
        warn!("chats.delete payload missing id, dropped");
        return Ok(());
    };
    ctx.queue.try_enqueue(WriteOp::DeleteChat { id })?;
    Ok(())
}

async fn seed_identity(ctx: HandlerContext, raw: Json, source: &'static str) -> anyhow::Result<()> {
    // contacts/lid-mapping payloads carry `lid`/`jid` (or `lid`/`pn`), not
    // the `participant`/`participantAlt` shape messages carry.
    let Some((lid, jid)) = IdentityResolver::extract_lid_pn_pair(&raw)
        .or_else(|| IdentityResolver::extract_alt_pair(&raw))
    else {
        return Ok(());
    };
    let identity_source = if source == "contacts" {
        IdentitySource::Contacts
    } else {
        IdentitySource::LidMapping
    };
    ctx.identity.resolve(&lid, Some(&jid), identity_source).await?;
    Ok(())
}
