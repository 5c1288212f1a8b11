//! Read-through group metadata service (spec §4.E). Metadata is considered
//! fresh for a fixed staleness window after the last full sync; anything
//! older is refetched from the provider and the cache+storage rows are
//! replaced wholesale. Granular `group-participants.update` events instead
//! patch the cached copy in place and bump its timestamp.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use wazap_core::types::{AdminRole, CanonicalId, GroupMetadata};
use wazap_sdk::Session;
use wazap_storage::Gateway;

use crate::convert::{from_row, parse_raw_metadata, to_row};
use crate::error::Result;

const DEFAULT_STALENESS: Duration = Duration::from_secs(30 * 60);
const DEFAULT_PRELOAD_CONCURRENCY: usize = 4;
const PRELOAD_FETCH_PACE: Duration = Duration::from_millis(150);

pub struct GroupMetadataServiceConfig {
    pub staleness_window: Duration,
    pub preload_concurrency: usize,
}

impl Default for GroupMetadataServiceConfig {
    fn default() -> Self {
        Self {
            staleness_window: DEFAULT_STALENESS,
            preload_concurrency: DEFAULT_PRELOAD_CONCURRENCY,
        }
    }
}

/// In-memory copies of group metadata, each guarded by its own mutex so a
/// slow fetch for one group never blocks reads of another.
pub struct GroupMetadataService {
    gateway: Arc<Gateway>,
    staleness_window: Duration,
    preload_permits: Semaphore,
    cache: dashmap::DashMap<String, Arc<Mutex<Option<GroupMetadata>>>>,
}

impl GroupMetadataService {
    pub fn new(gateway: Arc<Gateway>, cfg: GroupMetadataServiceConfig) -> Self {
        Self {
            gateway,
            staleness_window: cfg.staleness_window,
            preload_permits: Semaphore::new(cfg.preload_concurrency.max(1)),
            cache: dashmap::DashMap::new(),
        }
    }

    fn slot(&self, group_id: &str) -> Arc<Mutex<Option<GroupMetadata>>> {
        self.cache
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    fn is_fresh(&self, meta: &GroupMetadata) -> bool {
        Utc::now().signed_duration_since(meta.updated_at)
            < chrono::Duration::from_std(self.staleness_window).unwrap_or(chrono::Duration::zero())
    }

    pub async fn has_valid(&self, group_id: &str) -> bool {
        let slot = self.slot(group_id);
        let guard = slot.lock().await;
        matches!(guard.as_ref(), Some(meta) if self.is_fresh(meta))
    }

    /// Returns a fresh copy of group metadata: from the in-memory slot if
    /// not stale, else from storage if that row happens to be fresh, else
    /// from the provider (storing the refreshed copy both places).
    pub async fn get_or_fetch(
        &self,
        group_id: &str,
        session: &dyn Session,
    ) -> Result<GroupMetadata> {
        let slot = self.slot(group_id);
        let mut guard = slot.lock().await;

        if let Some(meta) = guard.as_ref() {
            if self.is_fresh(meta) {
                return Ok(meta.clone());
            }
        }

        if let Some(row) = self.gateway.find_group_metadata(group_id).await? {
            let meta = from_row(row)?;
            if self.is_fresh(&meta) {
                *guard = Some(meta.clone());
                return Ok(meta);
            }
        }

        debug!(group_id, "group metadata stale or absent, fetching from provider");
        let raw = session.fetch_group_metadata(group_id).await?;
        let meta = parse_raw_metadata(group_id, &raw)?;
        self.gateway.upsert_group_metadata(&to_row(&meta)?).await?;
        *guard = Some(meta.clone());
        Ok(meta)
    }

    /// Ingests a payload the provider pushed unprompted (`groups.upsert` /
    /// `groups.update`) without needing a session round-trip — the event
    /// already carries the same full shape `fetch_group_metadata` returns.
    pub async fn ingest(&self, group_id: &str, raw: &serde_json::Value) -> Result<GroupMetadata> {
        let meta = parse_raw_metadata(group_id, raw)?;
        self.gateway.upsert_group_metadata(&to_row(&meta)?).await?;
        let slot = self.slot(group_id);
        let mut guard = slot.lock().await;
        *guard = Some(meta.clone());
        Ok(meta)
    }

    /// Concurrently refreshes a batch of groups, paced by
    /// `preload_concurrency` so a cold-start reconnect doesn't open one
    /// provider request per group in parallel. Best-effort: one group's
    /// fetch failure doesn't abort the batch.
    pub async fn preload(self: &Arc<Self>, group_ids: &[String], session: Arc<dyn Session>) {
        let mut handles = Vec::with_capacity(group_ids.len());
        for group_id in group_ids {
            let service = self.clone();
            let session = session.clone();
            let group_id = group_id.clone();
            handles.push(tokio::spawn(async move {
                let _permit = service.preload_permits.acquire().await;
                // Small pace delay between fetches even within a concurrency
                // slot, so a cold-start reconnect with many known groups
                // doesn't hammer the provider the instant a permit frees up.
                tokio::time::sleep(PRELOAD_FETCH_PACE).await;
                if let Err(e) = service.get_or_fetch(&group_id, session.as_ref()).await {
                    warn!(group_id, error = %e, "group metadata preload failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Applies a `group-participants.update` diff to the cached copy
    /// in-place, refreshing its staleness timestamp. Falls back to a full
    /// fetch when nothing is cached yet, since a partial diff against
    /// nothing to diff against is meaningless.
    pub async fn apply_participants_update(
        &self,
        group_id: &str,
        added: &[(CanonicalId, AdminRole)],
        removed: &[CanonicalId],
        role_changed: &[(CanonicalId, AdminRole)],
    ) -> Result<Option<GroupMetadata>> {
        let slot = self.slot(group_id);
        let mut guard = slot.lock().await;

        let Some(meta) = guard.as_mut() else {
            return Ok(None);
        };

        for (id, role) in added {
            meta.apply_participant_add(id.clone(), *role);
        }
        for id in removed {
            meta.apply_participant_remove(id);
        }
        for (id, role) in role_changed {
            meta.apply_participant_role(id, *role);
        }
        meta.updated_at = Utc::now();

        self.gateway.upsert_group_metadata(&to_row(meta)?).await?;
        Ok(Some(meta.clone()))
    }

    pub fn invalidate(&self, group_id: &str) {
        self.cache.remove(group_id);
    }
}
