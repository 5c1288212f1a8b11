//! In-process cache tier sitting between the event router / dispatcher and
//! the storage gateway (spec §4.C). Five independent TTL+LRU caches plus a
//! bounded per-chat "recents" index, backed by `moka`'s synchronous cache —
//! the same crate the teacher's resolver used for its identity cache, scaled
//! out to cover messages, events, group metadata, contacts, and chats.

pub mod config;
pub mod entry;
pub mod events;
pub mod tier;

pub use config::{CacheEntryConfig, CacheTierConfig};
pub use entry::NamedCache;
pub use events::CacheEvent;
pub use tier::CacheTier;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn tiny_config() -> CacheEntryConfig {
        CacheEntryConfig {
            ttl: Duration::from_millis(50),
            check_period: Duration::from_millis(20),
            max_keys: 4,
            keep_after_cleanup: 2,
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips_the_payload() {
        let (tx, _rx) = tokio::sync::broadcast::channel(16);
        let cache = NamedCache::new("messages", tiny_config(), tx);
        cache.set("chat:1", json!({"text": "hi"}));
        assert_eq!(cache.get("chat:1"), Some(json!({"text": "hi"})));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let (tx, _rx) = tokio::sync::broadcast::channel(16);
        let cache = NamedCache::new("messages", tiny_config(), tx);
        assert_eq!(cache.get("nope"), None);
    }

    #[tokio::test]
    async fn ttl_override_expires_sooner_than_default() {
        let mut cfg = tiny_config();
        cfg.ttl = Duration::from_secs(60);
        let (tx, _rx) = tokio::sync::broadcast::channel(16);
        let cache = NamedCache::new("events", cfg, tx);
        cache.set_with_ttl("short", json!(1), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.run_pending_tasks();
        assert_eq!(cache.get("short"), None);
    }

    #[tokio::test]
    async fn recents_deque_stays_bounded() {
        let cfg = CacheTierConfig {
            recents_per_chat: 3,
            ..CacheTierConfig::default()
        };
        let tier = CacheTier::new(cfg);
        for i in 0..5 {
            tier.push_recent("chat:1", json!({"seq": i})).await;
        }
        let recents = tier.recents("chat:1").await;
        assert_eq!(recents.len(), 3);
        assert_eq!(recents[0], json!({"seq": 2}));
        assert_eq!(recents[2], json!({"seq": 4}));
    }

    #[tokio::test]
    async fn flush_all_clears_every_cache_and_recents() {
        let tier = CacheTier::new(CacheTierConfig::default());
        tier.messages().set("m1", json!("x"));
        tier.push_recent("c1", json!("y")).await;
        tier.flush_all();
        assert_eq!(tier.messages().get("m1"), None);
        assert!(tier.recents("c1").await.is_empty());
    }
}
