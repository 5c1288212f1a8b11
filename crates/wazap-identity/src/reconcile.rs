//! Rewrites historical `messages.sender_id` values after a lid's jid becomes
//! known, so the canonical id is consistent across a contact's whole
//! history rather than just messages received after the mapping appeared.

use std::sync::Arc;

use tracing::info;

use wazap_storage::Gateway;

const RECONCILE_BATCH_LIMIT: i64 = 1_000;

/// Walks every known identity mapping and, for any that resolved to a jid,
/// rewrites lingering `sender_id = lid` rows in chunks inside one
/// transaction per mapping — bounded so a single mapping with a long
/// history can't hold the write path hostage.
pub async fn run(gateway: Arc<Gateway>) -> crate::error::Result<u64> {
    let mut offset = 0i64;
    let mut rewritten = 0u64;
    const PAGE: i64 = 200;

    loop {
        let mappings = gateway.list_identity_mappings(PAGE, offset).await?;
        if mappings.is_empty() {
            break;
        }
        let page_len = mappings.len() as i64;

        for mapping in mappings {
            let Some(jid) = mapping.jid else { continue };
            if jid == mapping.lid {
                continue;
            }
            loop {
                let lid = mapping.lid.clone();
                let jid = jid.clone();
                let affected = gateway
                    .with_transaction(|tx| async move {
                        Gateway::rewrite_message_sender_tx(tx, &lid, &jid, RECONCILE_BATCH_LIMIT)
                            .await
                            .map_err(Into::into)
                    })
                    .await?;
                rewritten += affected;
                if affected < RECONCILE_BATCH_LIMIT as u64 {
                    break;
                }
            }
        }

        offset += page_len;
        if page_len < PAGE {
            break;
        }
    }

    info!(rewritten, "identity reconciliation sweep complete");
    Ok(rewritten)
}
