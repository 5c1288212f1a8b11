//! Boot-time sweep that mines `participantAlt` pairs out of already-stored
//! messages, for mappings that were never captured because the resolver
//! didn't exist yet (e.g. a fresh deploy pointed at an existing database).

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use wazap_core::types::IdentitySource;
use wazap_storage::Gateway;

use crate::resolver::IdentityResolver;

const BATCH_SIZE: i64 = 500;

pub async fn run(gateway: Arc<Gateway>, resolver: &IdentityResolver) -> crate::error::Result<u64> {
    let mut offset = 0i64;
    let mut discovered = 0u64;

    loop {
        let batch = gateway.scan_messages(BATCH_SIZE, offset).await?;
        if batch.is_empty() {
            break;
        }
        let batch_len = batch.len() as i64;

        for row in &batch {
            if let Some((lid, jid)) = IdentityResolver::extract_alt_pair(&row.raw_message) {
                resolver
                    .resolve(&lid, Some(&jid), IdentitySource::Message)
                    .await?;
                discovered += 1;
            }
        }

        offset += batch_len;
        if batch_len < BATCH_SIZE {
            break;
        }
    }

    info!(discovered, finished_at = %Utc::now(), "identity backfill sweep complete");
    Ok(discovered)
}
