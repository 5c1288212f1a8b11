use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::sync::Cache;
use moka::Expiry;
use serde_json::Value as Json;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::CacheEntryConfig;
use crate::events::CacheEvent;

#[derive(Clone)]
struct CachedValue {
    payload: Json,
    ttl_override: Option<Duration>,
}

/// Per-entry expiry: respects a `set`-time TTL override, otherwise falls
/// back to the cache's configured default. Re-inserting a key (`set` again)
/// restarts its clock, matching the "touch on write" half of the spec's
/// "set with override-TTL / get with touch" pair.
struct CacheExpiry {
    default_ttl: Duration,
}

impl Expiry<String, CachedValue> for CacheExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl_override.unwrap_or(self.default_ttl))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl_override.unwrap_or(self.default_ttl))
    }
}

/// One named cache in the tier (messages, events, groups, contacts, chats).
/// Writes are fire-and-forget from the caller's point of view — moka's sync
/// `Cache` performs inserts without blocking on the internal admission
/// pipeline, so producers never wait on a background eviction sweep.
/// Reads are plain concurrent-map lookups: synchronous and wait-free.
pub struct NamedCache {
    name: &'static str,
    inner: Cache<String, CachedValue>,
    max_keys: u64,
    keep_after_cleanup: u64,
}

impl NamedCache {
    pub fn new(name: &'static str, cfg: CacheEntryConfig, events: broadcast::Sender<CacheEvent>) -> Self {
        let listener_name = name;
        let listener_events = events.clone();
        let inner = Cache::builder()
            .max_capacity(cfg.max_keys)
            .time_to_idle(cfg.ttl)
            .expire_after(CacheExpiry {
                default_ttl: cfg.ttl,
            })
            .eviction_listener(move |key: Arc<String>, _value, cause| {
                let event = match cause {
                    RemovalCause::Expired => CacheEvent::Expired {
                        cache: listener_name,
                        key: (*key).clone(),
                    },
                    _ => CacheEvent::Evicted {
                        cache: listener_name,
                        key: (*key).clone(),
                    },
                };
                // A full broadcast channel just drops the oldest unread event;
                // there is no back-pressure contract to honor here.
                let _ = listener_events.send(event);
            })
            .build();

        Self {
            name,
            inner,
            max_keys: cfg.max_keys,
            keep_after_cleanup: cfg.keep_after_cleanup,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Json) {
        self.inner.insert(
            key.into(),
            CachedValue {
                payload: value,
                ttl_override: None,
            },
        );
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: Json, ttl: Duration) {
        self.inner.insert(
            key.into(),
            CachedValue {
                payload: value,
                ttl_override: Some(ttl),
            },
        );
    }

    /// `get` doubles as "touch": moka's `time_to_idle` configuration above
    /// slides the entry's expiry forward on every successful read.
    pub fn get(&self, key: &str) -> Option<Json> {
        self.inner.get(key).map(|v| v.payload)
    }

    pub fn remove(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn flush(&self) {
        self.inner.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }

    /// Manual top-up sweep for when the per-cache `max_capacity` admission
    /// policy hasn't caught up yet (moka evicts lazily, on its own
    /// schedule). Removes arbitrary entries — not necessarily the oldest,
    /// since the sync cache does not expose insertion order — until the
    /// entry count is back at or below `keep_after_cleanup`.
    pub fn sweep_if_over_cap(&self) {
        self.run_pending_tasks();
        let over = self.entry_count().saturating_sub(self.keep_after_cleanup);
        if over == 0 {
            return;
        }
        debug!(cache = self.name, over, max_keys = self.max_keys, "cache over its key budget, sweeping");
        let mut removed = 0u64;
        for (key, _) in self.inner.iter() {
            if removed >= over {
                break;
            }
            self.inner.invalidate(&*key);
            removed += 1;
        }
    }
}
