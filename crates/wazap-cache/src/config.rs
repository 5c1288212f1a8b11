use std::time::Duration;

/// Per-cache knobs, independent of `wazap_core::config::CacheEntryConfig`
/// so this crate has no dependency on the config loader — the binary
/// translates one into the other at boot.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntryConfig {
    pub ttl: Duration,
    pub check_period: Duration,
    pub max_keys: u64,
    pub keep_after_cleanup: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTierConfig {
    pub messages: CacheEntryConfig,
    pub events: CacheEntryConfig,
    pub groups: CacheEntryConfig,
    pub contacts: CacheEntryConfig,
    pub chats: CacheEntryConfig,
    pub global_max_keys: u64,
    pub recents_per_chat: usize,
}

impl Default for CacheEntryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            check_period: Duration::from_secs(120),
            max_keys: 5_000,
            keep_after_cleanup: 2_500,
        }
    }
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self {
            messages: CacheEntryConfig::default(),
            events: CacheEntryConfig::default(),
            groups: CacheEntryConfig {
                ttl: Duration::from_secs(30 * 60),
                ..CacheEntryConfig::default()
            },
            contacts: CacheEntryConfig::default(),
            chats: CacheEntryConfig::default(),
            global_max_keys: 20_000,
            recents_per_chat: 100,
        }
    }
}
