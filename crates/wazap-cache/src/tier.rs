use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value as Json;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::info;

use crate::config::CacheTierConfig;
use crate::entry::NamedCache;
use crate::events::CacheEvent;

/// The five independent caches named in spec §4.C, plus the `recents`
/// secondary index for per-chat message history. Each cache is addressed by
/// name (`tier.messages()`, `tier.groups()`, ...) rather than through a
/// generic `get(kind, key)` call, mirroring how the teacher's resolver cache
/// exposed one purpose-built accessor per concern.
pub struct CacheTier {
    messages: NamedCache,
    events_cache: NamedCache,
    groups: NamedCache,
    contacts: NamedCache,
    chats: NamedCache,
    recents: DashMap<String, AsyncMutex<VecDeque<Json>>>,
    recents_per_chat: usize,
    global_max_keys: u64,
    events_tx: broadcast::Sender<CacheEvent>,
}

impl CacheTier {
    pub fn new(cfg: CacheTierConfig) -> Arc<Self> {
        let (events_tx, _rx) = broadcast::channel(1024);

        let tier = Arc::new(Self {
            messages: NamedCache::new("messages", cfg.messages, events_tx.clone()),
            events_cache: NamedCache::new("events", cfg.events, events_tx.clone()),
            groups: NamedCache::new("groups", cfg.groups, events_tx.clone()),
            contacts: NamedCache::new("contacts", cfg.contacts, events_tx.clone()),
            chats: NamedCache::new("chats", cfg.chats, events_tx.clone()),
            recents: DashMap::new(),
            recents_per_chat: cfg.recents_per_chat,
            global_max_keys: cfg.global_max_keys,
            events_tx,
        });

        let sweep_period = cfg.messages.check_period;
        let sweep_tier = tier.clone();
        tokio::spawn(async move {
            sweep_tier.run_sweep_loop(sweep_period).await;
        });

        tier
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events_tx.subscribe()
    }

    pub fn messages(&self) -> &NamedCache {
        &self.messages
    }

    pub fn events_cache(&self) -> &NamedCache {
        &self.events_cache
    }

    pub fn groups(&self) -> &NamedCache {
        &self.groups
    }

    pub fn contacts(&self) -> &NamedCache {
        &self.contacts
    }

    pub fn chats(&self) -> &NamedCache {
        &self.chats
    }

    /// Records a message in a chat's bounded recent-history deque. Pushes to
    /// the back, evicts from the front once `recents_per_chat` is exceeded.
    pub async fn push_recent(&self, chat_id: &str, message: Json) {
        let slot = self
            .recents
            .entry(chat_id.to_string())
            .or_insert_with(|| AsyncMutex::new(VecDeque::with_capacity(self.recents_per_chat)));
        let mut deque = slot.lock().await;
        if deque.len() >= self.recents_per_chat {
            deque.pop_front();
        }
        deque.push_back(message);
    }

    pub async fn recents(&self, chat_id: &str) -> Vec<Json> {
        match self.recents.get(chat_id) {
            Some(slot) => slot.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn flush_all(&self) {
        self.messages.flush();
        self.events_cache.flush();
        self.groups.flush();
        self.contacts.flush();
        self.chats.flush();
        self.recents.clear();
        for cache in ["messages", "events", "groups", "contacts", "chats"] {
            let _ = self.events_tx.send(CacheEvent::Flushed { cache });
        }
    }

    fn total_entries(&self) -> u64 {
        self.messages.entry_count()
            + self.events_cache.entry_count()
            + self.groups.entry_count()
            + self.contacts.entry_count()
            + self.chats.entry_count()
    }

    /// Periodic sweep: always give each cache a chance to reclaim lazily
    /// expired entries, and when the tier as a whole is over its global
    /// budget, sweep every cache down toward its own `keep_after_cleanup`
    /// floor rather than singling one out.
    async fn run_sweep_loop(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            self.messages.run_pending_tasks();
            self.events_cache.run_pending_tasks();
            self.groups.run_pending_tasks();
            self.contacts.run_pending_tasks();
            self.chats.run_pending_tasks();

            let total = self.total_entries();
            if total > self.global_max_keys {
                info!(total, cap = self.global_max_keys, "cache tier over global key budget");
                self.messages.sweep_if_over_cap();
                self.events_cache.sweep_if_over_cap();
                self.groups.sweep_if_over_cap();
                self.contacts.sweep_if_over_cap();
                self.chats.sweep_if_over_cap();
            }
        }
    }
}
