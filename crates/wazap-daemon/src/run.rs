//! Builds the full component graph from a loaded [`WazapConfig`], starts
//! the connection supervisor, and drives the process until a TERM/INT
//! signal triggers an orderly shutdown (spec §4.G, §7).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use wazap_admin::{AdminCommands, GroupConfigStore};
use wazap_cache::{CacheEntryConfig as CacheTierEntryConfig, CacheTier, CacheTierConfig};
use wazap_connection::{ConnectionSupervisor, ConnectionSupervisorConfig, EventRouter};
use wazap_core::config::{CacheEntryConfig, WazapConfig};
use wazap_core::metrics::Metrics;
use wazap_core::types::CanonicalId;
use wazap_dispatch::{Dispatcher, DispatcherConfig, SendFacility};
use wazap_groups::{GroupMetadataService, GroupMetadataServiceConfig};
use wazap_identity::{backfill, reconcile, IdentityResolver, IdentityResolverConfig};
use wazap_queue::WriteQueue;
use wazap_sdk::auth::FileAuthStore;
use wazap_sdk::fake::FakeSessionFactory;
use wazap_sdk::session::SessionFactory;
use wazap_storage::gateway::GatewayConfig;
use wazap_storage::Gateway;

use crate::{commands, handlers};

const QUEUE_CAPACITY: usize = 1_000;
const QUEUE_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const RUN_LOOP_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

fn cache_entry(src: &CacheEntryConfig) -> CacheTierEntryConfig {
    CacheTierEntryConfig {
        ttl: Duration::from_secs(src.ttl_secs),
        check_period: Duration::from_secs(src.check_period_secs),
        max_keys: src.max_keys,
        keep_after_cleanup: src.keep_after_cleanup,
    }
}

fn cache_tier_config(config: &WazapConfig) -> CacheTierConfig {
    CacheTierConfig {
        messages: cache_entry(&config.cache.messages),
        events: cache_entry(&config.cache.events),
        groups: cache_entry(&config.cache.groups),
        contacts: cache_entry(&config.cache.contacts),
        chats: cache_entry(&config.cache.chats),
        global_max_keys: config.cache.global_max_keys,
        recents_per_chat: config.cache.recents_per_chat,
    }
}

/// The provider never tells us our own account id without a live wire
/// session, and the real protocol is out of scope — so the bot's canonical
/// id is config-provided. A missing value degrades to a clearly-bogus
/// placeholder with a loud warning rather than a panic, since every
/// downstream component (admin commands, dispatcher, send facility) needs
/// *some* `CanonicalId` to construct.
fn resolve_bot_id(config: &WazapConfig) -> CanonicalId {
    match &config.provider.bot_id {
        Some(id) => CanonicalId::from(id.clone()),
        None => {
            warn!("provider.bot_id not set in config; admin self-exclusion and send-as identity will be wrong");
            CanonicalId::from("unset-bot-id@s.whatsapp.net".to_string())
        }
    }
}

pub async fn run(config: WazapConfig) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new());

    let gateway = Arc::new(
        Gateway::connect(&GatewayConfig {
            host: config.storage.host.clone(),
            port: config.storage.port,
            user: config.storage.user.clone(),
            password: config.storage.password.clone(),
            database: config.effective_database_name(),
            pool_size: config.storage.pool_size,
            slow_query_threshold_ms: config.storage.slow_query_threshold_ms,
        })
        .await?,
    );
    info!("storage gateway connected");

    let (queue, queue_shutdown) = WriteQueue::spawn(
        gateway.clone(),
        metrics.clone(),
        QUEUE_CAPACITY,
        QUEUE_SHUTDOWN_GRACE,
    );

    let cache = CacheTier::new(cache_tier_config(&config));

    let identity = Arc::new(IdentityResolver::new(
        gateway.clone(),
        queue.clone(),
        IdentityResolverConfig {
            cache_ttl: Duration::from_secs(config.identity.cache_ttl_secs),
            ..IdentityResolverConfig::default()
        },
    ));

    if config.identity.backfill_on_start {
        let gateway = gateway.clone();
        let identity = identity.clone();
        tokio::spawn(async move {
            match backfill::run(gateway.clone(), &identity).await {
                Ok(n) => info!(discovered = n, "identity backfill complete"),
                Err(e) => warn!(error = %e, "identity backfill failed"),
            }
            if let Err(e) = reconcile::run(gateway).await {
                warn!(error = %e, "identity reconciliation sweep failed");
            }
        });
    }

    let groups = Arc::new(GroupMetadataService::new(
        gateway.clone(),
        GroupMetadataServiceConfig {
            staleness_window: Duration::from_secs(config.cache.groups.ttl_secs),
            ..GroupMetadataServiceConfig::default()
        },
    ));

    let group_configs = Arc::new(GroupConfigStore::new(gateway.clone()));

    let bot_id = resolve_bot_id(&config);

    let session_factory: Arc<dyn SessionFactory> = Arc::new(FakeSessionFactory);
    let session = Arc::from(session_factory.build());

    let send = Arc::new(SendFacility::new(Arc::clone(&session), queue.clone(), bot_id.clone()));

    let admin = Arc::new(AdminCommands::new(
        Arc::clone(&session),
        groups.clone(),
        group_configs.clone(),
        bot_id.clone(),
        config.process.owner_id.clone(),
    ));

    let broadcast = Arc::new(wazap_broadcast::BroadcastEngine::new(
        Arc::clone(&session),
        config.broadcast.clone(),
    ));

    let registry = commands::build_registry(
        admin.clone(),
        broadcast.clone(),
        gateway.clone(),
        cache.clone(),
        config.process.owner_id.clone(),
    );

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&session),
        queue.clone(),
        identity.clone(),
        groups.clone(),
        group_configs.clone(),
        send.clone(),
        registry,
        bot_id.clone(),
        DispatcherConfig {
            default_command_prefix: config.process.default_command_prefix.clone(),
            react_emoji: config.process.react_emoji.clone(),
            start_login_trigger: config.process.start_login_trigger.clone(),
            auto_sticker_enabled: false,
            ..DispatcherConfig::default()
        },
    ));

    let auth: Arc<dyn wazap_sdk::auth::AuthStore> = Arc::new(FileAuthStore::new(config.provider.auth_dir.clone()));

    let mut router = EventRouter::new(metrics.clone());
    handlers::register_all(
        &mut router,
        handlers::HandlerContext {
            queue: queue.clone(),
            identity: identity.clone(),
            groups: groups.clone(),
            dispatcher: dispatcher.clone(),
            auth: auth.clone(),
            session: Arc::clone(&session),
            cache: cache.clone(),
        },
    );
    let router = Arc::new(router);

    let on_open_groups = groups.clone();
    let on_open_gateway = gateway.clone();
    let on_open_session = Arc::clone(&session);
    let on_open = move || {
        let groups = on_open_groups.clone();
        let gateway = on_open_gateway.clone();
        let session = Arc::clone(&on_open_session);
        tokio::spawn(async move {
            info!("connection open, preloading known group metadata");
            match gateway.list_group_chat_ids().await {
                Ok(ids) => groups.preload(&ids, session).await,
                Err(e) => warn!(error = %e, "failed to list known groups for preload"),
            }
        });
    };

    let (supervisor, _state_rx) = ConnectionSupervisor::with_auth_store(
        session_factory,
        router,
        ConnectionSupervisorConfig {
            reconnect_base: Duration::from_secs(wazap_core::config::DEFAULT_RECONNECT_BASE_SECS),
            reconnect_max_attempts: wazap_core::config::DEFAULT_RECONNECT_MAX_ATTEMPTS,
            reconnect_window: Duration::from_secs(wazap_core::config::DEFAULT_RECONNECT_ROLLING_WINDOW_SECS),
        },
        Some(Arc::new(on_open)),
        Some(auth.clone()),
    );

    let run_handle = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run().await }
    });

    let snapshot_metrics = metrics.clone();
    let snapshot_interval = Duration::from_secs(config.observability.snapshot_interval_secs);
    let snapshot_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(snapshot_interval);
        loop {
            tick.tick().await;
            let snapshot = snapshot_metrics.snapshot();
            info!(?snapshot, "metrics snapshot");
        }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining");

    snapshot_task.abort();
    supervisor.shutdown();
    if tokio::time::timeout(RUN_LOOP_SHUTDOWN_GRACE, run_handle).await.is_err() {
        warn!("connection supervisor did not stop within the shutdown grace period");
    }
    queue_shutdown.shutdown().await;
    gateway.shutdown().await;

    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
