//! LID ↔ JID canonical-id resolution (spec §4.D). WhatsApp's privacy mode
//! addresses a contact by an opaque `lid` in most events; the event router
//! and message store need a stable id that survives a later jid disclosure
//! — this is that seam.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde_json::Value as Json;
use tracing::debug;

use wazap_core::types::{CanonicalId, IdentitySource};
use wazap_queue::{ops::WriteOp, WriteQueueHandle};
use wazap_storage::Gateway;

use crate::error::Result;

const DEFAULT_CACHE_TTL_SECS: u64 = 600;

pub struct IdentityResolverConfig {
    pub cache_ttl: Duration,
    pub cache_max_keys: u64,
}

impl Default for IdentityResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_max_keys: 50_000,
        }
    }
}

/// Resolves a `lid` (and optionally an accompanying `jid`) to the canonical
/// id every other component stores and compares against. Opportunistically
/// persists newly-observed mappings through the write queue rather than
/// blocking the caller on a database round trip.
pub struct IdentityResolver {
    gateway: Arc<Gateway>,
    queue: WriteQueueHandle,
    cache: Cache<String, CanonicalId>,
}

impl IdentityResolver {
    pub fn new(gateway: Arc<Gateway>, queue: WriteQueueHandle, cfg: IdentityResolverConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(cfg.cache_max_keys)
            .time_to_live(cfg.cache_ttl)
            .build();
        Self {
            gateway,
            queue,
            cache,
        }
    }

    /// Resolve a lid to its canonical id, without asserting a new jid. Reads
    /// the in-memory cache first, then the storage gateway, falling back to
    /// lid-form when nothing is known yet.
    pub async fn canonical_for(&self, lid: &str) -> Result<CanonicalId> {
        if let Some(hit) = self.cache.get(lid) {
            return Ok(hit);
        }
        let canonical = match self.gateway.find_identity_mapping(lid).await? {
            Some(row) => match row.jid {
                Some(jid) => CanonicalId::from(jid),
                None => CanonicalId::from(lid),
            },
            None => CanonicalId::from(lid),
        };
        self.cache.insert(lid.to_string(), canonical.clone());
        Ok(canonical)
    }

    /// Resolve from an inbound event that carries a lid-form id and,
    /// possibly, an alt jid-form id (`participantAlt` in the raw payload).
    /// Either way this enqueues an identity-mapping upsert (source tagged
    /// per `source`) so a first-seen lid gets its `{lid, jid: null}` row
    /// even when no jid accompanies it — the upsert is insert-if-absent and
    /// never overwrites an existing non-null jid with null.
    pub async fn resolve(
        &self,
        lid: &str,
        jid: Option<&str>,
        source: IdentitySource,
    ) -> Result<CanonicalId> {
        let canonical = match jid {
            Some(jid) => CanonicalId::from(jid),
            None => self.canonical_for(lid).await?,
        };

        self.cache.insert(lid.to_string(), canonical.clone());

        let op = WriteOp::UpsertIdentityMapping {
            lid: lid.to_string(),
            jid: jid.map(str::to_string),
            seen_at: chrono::Utc::now(),
            source: source.to_string(),
        };
        // Persisting the mapping must never block message processing — the
        // queue's back-pressure contract already protects the database from
        // being overwhelmed, so a full queue here just means this mapping
        // gets picked up the next time this lid is seen.
        if let Err(e) = self.queue.try_enqueue(op) {
            debug!(lid, error = %e, "identity mapping upsert dropped, will retry on next sighting");
        }

        Ok(canonical)
    }

    /// Pulls a `(lid, jid)` pair out of a raw message payload's
    /// `participant`/`participantAlt` fields, the shape carried by stored
    /// `messages.raw_message` blobs (used by the backfill sweep and by
    /// `messages.upsert`).
    pub fn extract_alt_pair(raw: &Json) -> Option<(String, String)> {
        let lid = raw.get("participant")?.as_str()?.to_string();
        let jid = raw.get("participantAlt")?.as_str()?.to_string();
        Some((lid, jid))
    }

    /// Pulls a `(lid, jid)` pair out of a `lid-mapping.update` or
    /// `contacts.upsert`/`contacts.update` payload. These carry the pair
    /// under `lid`/`jid`, or `lid`/`pn` (a bare phone number the provider
    /// emits for newly-disclosed numbers, normalized here to jid form).
    pub fn extract_lid_pn_pair(raw: &Json) -> Option<(String, String)> {
        let lid = raw.get("lid")?.as_str()?.to_string();
        if let Some(jid) = raw.get("jid").and_then(Json::as_str) {
            return Some((lid, jid.to_string()));
        }
        let pn = raw.get("pn")?;
        let digits = match pn {
            Json::String(s) => s.clone(),
            Json::Number(n) => n.to_string(),
            _ => return None,
        };
        let jid = if digits.contains('@') {
            digits
        } else {
            format!("{digits}@s.whatsapp.net")
        };
        Some((lid, jid))
    }

    pub fn invalidate(&self, lid: &str) {
        self.cache.invalidate(lid);
    }
}
