use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMAND_PREFIX: &str = "/";
pub const DEFAULT_REACT_EMOJI: &str = "⏳";
pub const DEFAULT_START_LOGIN_TRIGGER: &str = "iniciar";
pub const DEFAULT_STALENESS_WINDOW_SECS: u64 = 30 * 60;
pub const DEFAULT_RECONNECT_ROLLING_WINDOW_SECS: u64 = 10 * 60;
pub const DEFAULT_RECONNECT_BASE_SECS: u64 = 3;
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_IDENTITY_CACHE_TTL_SECS: u64 = 10 * 60;

/// Top-level config (`wazap.toml` + `WAZAP_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WazapConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

impl Default for WazapConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            provider: ProviderConfig::default(),
            process: ProcessConfig::default(),
            cache: CacheConfig::default(),
            identity: IdentityConfig::default(),
            observability: ObservabilityConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

/// Relational store connection. Host/user/password/database are required —
/// missing any of them at boot is a `Config` error the binary exits `1` on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub host: String,
    #[serde(default = "default_storage_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,
    pub monitor_log_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: default_storage_port(),
            user: String::new(),
            password: String::new(),
            database: String::new(),
            pool_size: default_pool_size(),
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
            monitor_log_path: None,
        }
    }
}

fn default_storage_port() -> u16 {
    3306
}
fn default_pool_size() -> u32 {
    10
}
fn default_slow_query_threshold_ms() -> u64 {
    200
}

/// Messaging provider (SDK) connection details. The core never speaks the
/// wire protocol directly — this only points at where to find auth state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_auth_dir")]
    pub auth_dir: String,
    #[serde(default = "default_qr_dir")]
    pub qr_dir: String,
    pub pinned_sdk_version: Option<String>,
    /// The canonical id of the account this process operates as. Known
    /// ahead of time from a prior login rather than learned mid-run, since
    /// every component that needs to exclude the bot from an operation
    /// (admin add/remove, anti-link) is constructed once at boot.
    pub bot_id: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            auth_dir: default_auth_dir(),
            qr_dir: default_qr_dir(),
            pinned_sdk_version: None,
            bot_id: None,
        }
    }
}

fn default_auth_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wazap/auth", home)
}
fn default_qr_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wazap/qr", home)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default = "default_node_env")]
    pub node_env: String,
    pub owner_id: Option<String>,
    #[serde(default = "default_command_prefix")]
    pub default_command_prefix: String,
    #[serde(default = "default_react_emoji")]
    pub react_emoji: String,
    #[serde(default = "default_start_login_trigger")]
    pub start_login_trigger: String,
    pub pm2_app_name: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            node_env: default_node_env(),
            owner_id: None,
            default_command_prefix: default_command_prefix(),
            react_emoji: default_react_emoji(),
            start_login_trigger: default_start_login_trigger(),
            pm2_app_name: None,
            log_level: default_log_level(),
        }
    }
}

fn default_node_env() -> String {
    "production".to_string()
}
fn default_command_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}
fn default_react_emoji() -> String {
    DEFAULT_REACT_EMOJI.to_string()
}
fn default_start_login_trigger() -> String {
    DEFAULT_START_LOGIN_TRIGGER.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Per-entity TTL/check-period/capacity settings for the five cache tier
/// instances (messages, events, groups, contacts, chats).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_check_period_secs")]
    pub check_period_secs: u64,
    #[serde(default = "default_cache_max_keys")]
    pub max_keys: u64,
    #[serde(default = "default_cache_keep_after_cleanup")]
    pub keep_after_cleanup: u64,
}

impl Default for CacheEntryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            check_period_secs: default_cache_check_period_secs(),
            max_keys: default_cache_max_keys(),
            keep_after_cleanup: default_cache_keep_after_cleanup(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    600
}
fn default_cache_check_period_secs() -> u64 {
    120
}
fn default_cache_max_keys() -> u64 {
    5_000
}
fn default_cache_keep_after_cleanup() -> u64 {
    2_500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub messages: CacheEntryConfig,
    #[serde(default)]
    pub events: CacheEntryConfig,
    #[serde(default)]
    pub groups: CacheEntryConfig,
    #[serde(default)]
    pub contacts: CacheEntryConfig,
    #[serde(default)]
    pub chats: CacheEntryConfig,
    #[serde(default = "default_global_max_keys")]
    pub global_max_keys: u64,
    #[serde(default = "default_recents_per_chat")]
    pub recents_per_chat: usize,
    #[serde(default = "bool_true")]
    pub clone_on_get: bool,
    #[serde(default = "bool_true")]
    pub auto_clean: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            messages: CacheEntryConfig::default(),
            events: CacheEntryConfig::default(),
            groups: CacheEntryConfig {
                ttl_secs: DEFAULT_STALENESS_WINDOW_SECS,
                ..CacheEntryConfig::default()
            },
            contacts: CacheEntryConfig::default(),
            chats: CacheEntryConfig::default(),
            global_max_keys: default_global_max_keys(),
            recents_per_chat: default_recents_per_chat(),
            clone_on_get: true,
            auto_clean: true,
        }
    }
}

fn default_global_max_keys() -> u64 {
    20_000
}
fn default_recents_per_chat() -> usize {
    100
}
fn bool_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub backfill_on_start: bool,
    #[serde(default = "default_backfill_batch_size")]
    pub backfill_batch_size: u32,
    #[serde(default = "default_identity_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_reconciliation_batch_size")]
    pub reconciliation_batch_size: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            backfill_on_start: false,
            backfill_batch_size: default_backfill_batch_size(),
            cache_ttl_secs: default_identity_cache_ttl_secs(),
            reconciliation_batch_size: default_reconciliation_batch_size(),
        }
    }
}

fn default_backfill_batch_size() -> u32 {
    500
}
fn default_identity_cache_ttl_secs() -> u64 {
    DEFAULT_IDENTITY_CACHE_TTL_SECS
}
fn default_reconciliation_batch_size() -> u32 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_metrics_host")]
    pub metrics_host: String,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default)]
    pub db_monitor_enabled: bool,
    #[serde(default = "default_slow_query_alert_threshold_ms")]
    pub slow_query_alert_threshold_ms: u64,
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_host: default_metrics_host(),
            metrics_port: default_metrics_port(),
            metrics_path: default_metrics_path(),
            db_monitor_enabled: false,
            slow_query_alert_threshold_ms: default_slow_query_alert_threshold_ms(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
        }
    }
}

fn default_metrics_host() -> String {
    "127.0.0.1".to_string()
}
fn default_metrics_port() -> u16 {
    9464
}
fn default_metrics_path() -> String {
    "/metrics".to_string()
}
fn default_slow_query_alert_threshold_ms() -> u64 {
    1_000
}
fn default_snapshot_interval_secs() -> u64 {
    60
}

/// A single broadcast mode preset: concurrency, jitter range, retry count,
/// backoff base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastModeConfig {
    pub concurrency: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub retries: u32,
    pub backoff_base_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_mode")]
    pub default: BroadcastModeConfig,
    #[serde(default = "fast_mode")]
    pub fast: BroadcastModeConfig,
    #[serde(default = "safe_mode")]
    pub safe: BroadcastModeConfig,
    #[serde(default = "default_progress_every_n")]
    pub progress_every_n: u32,
    #[serde(default = "default_progress_every_secs")]
    pub progress_every_secs: u64,
    #[serde(default = "default_failure_sample_size")]
    pub failure_sample_size: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            default: default_mode(),
            fast: fast_mode(),
            safe: safe_mode(),
            progress_every_n: default_progress_every_n(),
            progress_every_secs: default_progress_every_secs(),
            failure_sample_size: default_failure_sample_size(),
        }
    }
}

fn default_mode() -> BroadcastModeConfig {
    BroadcastModeConfig {
        concurrency: 5,
        jitter_min_ms: 250,
        jitter_max_ms: 1_500,
        retries: 3,
        backoff_base_secs: 2,
    }
}
fn fast_mode() -> BroadcastModeConfig {
    BroadcastModeConfig {
        concurrency: 10,
        jitter_min_ms: 50,
        jitter_max_ms: 400,
        retries: 2,
        backoff_base_secs: 1,
    }
}
fn safe_mode() -> BroadcastModeConfig {
    BroadcastModeConfig {
        concurrency: 2,
        jitter_min_ms: 800,
        jitter_max_ms: 3_000,
        retries: 5,
        backoff_base_secs: 3,
    }
}
fn default_progress_every_n() -> u32 {
    25
}
fn default_progress_every_secs() -> u64 {
    10
}
fn default_failure_sample_size() -> usize {
    10
}

impl WazapConfig {
    /// The database name actually connected to: `storage.database` suffixed
    /// with `process.node_env` when that tag isn't `production`, so a
    /// `staging`/`dev` process never shares tables with production off one
    /// shared `storage.database` value (spec §4.J: "pins derived values,
    /// e.g. database name with env suffix").
    pub fn effective_database_name(&self) -> String {
        if self.process.node_env == "production" {
            self.storage.database.clone()
        } else {
            format!("{}_{}", self.storage.database, self.process.node_env)
        }
    }

    /// Load config from a TOML file with `WAZAP_*` env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. `~/.wazap/wazap.toml`
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: WazapConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WAZAP_").split("_"))
            .extract()
            .map_err(|e| crate::error::WazapError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Eagerly checked invariants beyond what serde defaults can express —
    /// host/user/password/database must be non-empty even though the field
    /// itself is a plain `String`.
    fn validate(&self) -> crate::error::Result<()> {
        if self.storage.host.trim().is_empty() {
            return Err(crate::error::WazapError::Config(
                "storage.host is required".to_string(),
            ));
        }
        if self.storage.user.trim().is_empty() {
            return Err(crate::error::WazapError::Config(
                "storage.user is required".to_string(),
            ));
        }
        if self.storage.password.is_empty() {
            return Err(crate::error::WazapError::Config(
                "storage.password is required".to_string(),
            ));
        }
        if self.storage.database.trim().is_empty() {
            return Err(crate::error::WazapError::Config(
                "storage.database is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wazap/wazap.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_database() {
        let mut config = WazapConfig::default();
        config.storage.host = "localhost".to_string();
        config.storage.user = "root".to_string();
        config.storage.password = "secret".to_string();
        config.storage.database = String::new();

        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_fully_populated_storage() {
        let mut config = WazapConfig::default();
        config.storage.host = "localhost".to_string();
        config.storage.user = "root".to_string();
        config.storage.password = "secret".to_string();
        config.storage.database = "wazap".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn broadcast_presets_differ_in_concurrency() {
        let config = BroadcastConfig::default();
        assert!(config.fast.concurrency > config.default.concurrency);
        assert!(config.safe.concurrency < config.default.concurrency);
    }

    #[test]
    fn effective_database_name_is_unsuffixed_in_production() {
        let mut config = WazapConfig::default();
        config.storage.database = "wazap".to_string();
        config.process.node_env = "production".to_string();
        assert_eq!(config.effective_database_name(), "wazap");
    }

    #[test]
    fn effective_database_name_gets_env_suffix_outside_production() {
        let mut config = WazapConfig::default();
        config.storage.database = "wazap".to_string();
        config.process.node_env = "staging".to_string();
        assert_eq!(config.effective_database_name(), "wazap_staging");
    }
}
