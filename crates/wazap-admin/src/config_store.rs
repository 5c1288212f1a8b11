//! Typed wrapper over the group-config table: per-group settings keyed by
//! group id, plus one reserved-key row holding process-wide state (the
//! premium-user allowlist) that isn't naturally scoped to any single group.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use wazap_core::types::{GroupConfig, GroupConfigPatch};
use wazap_storage::Gateway;

use crate::error::Result;

/// Not a valid group id (missing the `@g.us`/`@s.whatsapp.net` suffix every
/// real WhatsApp id carries), so it can never collide with a real group's
/// configuration row.
const GLOBAL_KEY: &str = "__global__";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct GlobalAdminConfig {
    #[serde(default)]
    premium_users: BTreeSet<String>,
}

pub struct GroupConfigStore {
    gateway: Arc<Gateway>,
}

impl GroupConfigStore {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Reads on a missing row yield the default (empty) configuration.
    pub async fn get(&self, group_id: &str) -> Result<GroupConfig> {
        match self.gateway.find_group_config(group_id).await? {
            Some(raw) => Ok(parse_config(raw)),
            None => Ok(GroupConfig::default()),
        }
    }

    /// Atomically read-modify-write the group's configuration.
    pub async fn patch(&self, group_id: &str, patch: GroupConfigPatch) -> Result<GroupConfig> {
        let updated = self
            .gateway
            .transact_group_config(group_id, move |current| {
                let mut config = current.map(parse_config).unwrap_or_default();
                config.merge(patch);
                serde_json::to_value(&config).expect("GroupConfig always serializes")
            })
            .await?;
        Ok(parse_config(updated))
    }

    /// `GroupConfigPatch` has no way to express "clear back to the
    /// default" (`None` fields are left untouched, not wiped), so resetting
    /// the command prefix writes the cleared field directly.
    pub async fn reset_prefix(&self, group_id: &str) -> Result<GroupConfig> {
        let updated = self
            .gateway
            .transact_group_config(group_id, move |current| {
                let mut config = current.map(parse_config).unwrap_or_default();
                config.command_prefix = None;
                serde_json::to_value(&config).expect("GroupConfig always serializes")
            })
            .await?;
        Ok(parse_config(updated))
    }

    pub async fn premium_users(&self) -> Result<BTreeSet<String>> {
        Ok(self.global().await?.premium_users)
    }

    pub async fn add_premium_user(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.gateway
            .transact_group_config(GLOBAL_KEY, move |current| {
                let mut global = parse_global(current);
                global.premium_users.insert(id);
                serde_json::to_value(&global).expect("GlobalAdminConfig always serializes")
            })
            .await?;
        Ok(())
    }

    pub async fn remove_premium_user(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.gateway
            .transact_group_config(GLOBAL_KEY, move |current| {
                let mut global = parse_global(current);
                global.premium_users.remove(&id);
                serde_json::to_value(&global).expect("GlobalAdminConfig always serializes")
            })
            .await?;
        Ok(())
    }

    async fn global(&self) -> Result<GlobalAdminConfig> {
        match self.gateway.find_group_config(GLOBAL_KEY).await? {
            Some(raw) => Ok(parse_global(Some(raw))),
            None => Ok(GlobalAdminConfig::default()),
        }
    }
}

fn parse_config(raw: Json) -> GroupConfig {
    serde_json::from_value(raw).unwrap_or_default()
}

fn parse_global(raw: Option<Json>) -> GlobalAdminConfig {
    raw.and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_defaults_on_garbage() {
        let config = parse_config(serde_json::json!({"not": "a config"}));
        assert!(!config.welcome_enabled);
    }

    #[test]
    fn parse_global_defaults_on_none() {
        let global = parse_global(None);
        assert!(global.premium_users.is_empty());
    }
}
