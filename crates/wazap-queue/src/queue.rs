//! Single-producer/single-consumer ordered write pipeline in front of the
//! storage gateway (spec §4.B). A bounded `tokio::mpsc` channel gives FIFO
//! ordering for free — per-key ordering is a corollary of global ordering
//! since there is exactly one consumer.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value as Json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use wazap_core::metrics::Metrics;
use wazap_storage::error::StorageError;
use wazap_storage::gateway::ChatRow;
use wazap_storage::Gateway;

use crate::error::{QueueError, Result};
use crate::ops::WriteOp;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Handle producers hold to enqueue writes. Cheap to clone (wraps the
/// channel sender and a shared depth counter).
#[derive(Clone)]
pub struct WriteQueueHandle {
    tx: mpsc::Sender<WriteOp>,
    depth: Arc<AtomicU64>,
}

impl WriteQueueHandle {
    /// Builds a handle around a bare channel half, bypassing `WriteQueue::spawn`'s
    /// consumer task. Used by this crate's own tests and by downstream crates
    /// (dispatch, identity) that need a handle to construct without a live
    /// `Gateway` behind it.
    pub fn from_parts(tx: mpsc::Sender<WriteOp>) -> Self {
        Self {
            tx,
            depth: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Block until there is room in the bounded channel. This is the
    /// primary back-pressure contract: producers slow down with the
    /// consumer rather than growing memory unboundedly.
    pub async fn enqueue(&self, op: WriteOp) -> Result<()> {
        self.tx
            .send(op)
            .await
            .map_err(|_| QueueError::ShuttingDown)?;
        self.depth.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    /// Non-blocking variant: drops and logs rather than waiting when the
    /// channel is full. Used by call sites where an inbound event loop must
    /// never stall (e.g. a hot `messages.upsert` fan-out that should not let
    /// a slow database jam the event router).
    pub fn try_enqueue(&self, op: WriteOp) -> Result<()> {
        match self.tx.try_send(op) {
            Ok(()) => {
                self.depth.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(op)) => {
                warn!(kind = op.kind(), key = %op.key(), "write queue full, dropping item");
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::ShuttingDown),
        }
    }

    pub fn depth(&self) -> u64 {
        self.depth.load(AtomicOrdering::SeqCst)
    }
}

/// Owns the consumer side. `spawn` starts the drain loop; the returned
/// handle is what producers use, and the returned shutdown sender drains
/// the queue within a grace period before the task exits.
pub struct WriteQueue;

impl WriteQueue {
    /// `capacity` bounds the channel (back-pressure threshold).
    pub fn spawn(
        gateway: Arc<Gateway>,
        metrics: Arc<Metrics>,
        capacity: usize,
        shutdown_grace: Duration,
    ) -> (WriteQueueHandle, QueueShutdown) {
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let depth = Arc::new(AtomicU64::new(0));

        let consumer_depth = depth.clone();
        let join = tokio::spawn(consumer_loop(
            rx,
            gateway,
            metrics,
            consumer_depth,
            shutdown_rx,
            shutdown_grace,
        ));

        (
            WriteQueueHandle { tx, depth },
            QueueShutdown {
                shutdown_tx,
                join: Some(join),
            },
        )
    }
}

pub struct QueueShutdown {
    shutdown_tx: watch::Sender<bool>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl QueueShutdown {
    /// Signal the consumer to drain and stop, then wait for it (bounded by
    /// the grace period passed to `spawn`).
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(join) = self.join.take() {
            if join.await.is_err() {
                error!("write queue consumer task panicked during shutdown");
            }
        }
    }
}

async fn consumer_loop(
    mut rx: mpsc::Receiver<WriteOp>,
    gateway: Arc<Gateway>,
    metrics: Arc<Metrics>,
    depth: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
    shutdown_grace: Duration,
) {
    info!("write queue consumer started");
    loop {
        tokio::select! {
            biased;
            op = rx.recv() => {
                match op {
                    Some(op) => {
                        apply_with_retry(&gateway, &metrics, op).await;
                        depth.fetch_sub(1, AtomicOrdering::SeqCst);
                    }
                    None => {
                        info!("write queue channel closed, consumer exiting");
                        return;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // Flush whatever is already buffered within the grace period.
    info!("write queue draining before shutdown");
    let drain = async {
        while let Some(op) = rx.recv().await {
            apply_with_retry(&gateway, &metrics, op).await;
            depth.fetch_sub(1, AtomicOrdering::SeqCst);
        }
    };
    if tokio::time::timeout(shutdown_grace, drain).await.is_err() {
        warn!("write queue drain exceeded shutdown grace period, remaining items dropped");
    }
    info!("write queue consumer stopped");
}

/// Apply one op with a small bounded retry on transient faults. Permanent
/// faults are logged and dropped immediately — the consumer never blocks on
/// a single bad item.
async fn apply_with_retry(gateway: &Gateway, metrics: &Metrics, op: WriteOp) {
    let kind = op.kind();
    let key = op.key();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match apply(gateway, &op).await {
            Ok(()) => {
                metrics.incr(&format!("queue.applied.{kind}"));
                debug!(kind, key = %key, attempt, "write applied");
                return;
            }
            Err(e) if is_transient(&e) && attempt < MAX_RETRY_ATTEMPTS => {
                let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                warn!(kind, key = %key, attempt, error = %e, retry_after_ms = delay, "transient storage fault, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => {
                metrics.incr(&format!("queue.dropped.{kind}"));
                error!(kind, key = %key, attempt, error = %e, "write dropped after exhausting retries");
                return;
            }
        }
    }
}

fn is_transient(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::Database(sqlx::Error::PoolTimedOut)
            | StorageError::Database(sqlx::Error::Io(_))
            | StorageError::Database(sqlx::Error::PoolClosed)
    )
}

async fn apply(gateway: &Gateway, op: &WriteOp) -> std::result::Result<(), StorageError> {
    match op {
        WriteOp::InsertMessage(row) => gateway.insert_message(row).await,
        WriteOp::UpsertChat {
            row,
            partial,
            force_name,
        } => apply_chat_upsert(gateway, row, *partial, *force_name).await,
        WriteOp::UpsertIdentityMapping {
            lid,
            jid,
            seen_at,
            source,
        } => {
            let rewritten = gateway
                .upsert_identity_mapping_with_reconcile(lid, jid.as_deref(), *seen_at, source)
                .await?;
            if rewritten > 0 {
                info!(lid, rewritten, "identity resolved, rewrote historical message senders");
            }
            Ok(())
        }
        WriteOp::DeleteChat { id } => gateway.remove_chat(id).await,
    }
}

/// Partial chat upserts merge the raw payload shallowly over the existing
/// row rather than replacing it wholesale; `force_name` always wins on the
/// display name regardless of partial/full.
async fn apply_chat_upsert(
    gateway: &Gateway,
    row: &ChatRow,
    partial: bool,
    force_name: bool,
) -> std::result::Result<(), StorageError> {
    if !partial {
        return gateway.upsert_chat(row, force_name).await;
    }

    let merged_raw = match gateway.find_chat(&row.id).await? {
        Some(existing) => shallow_merge(existing.raw_chat, row.raw_chat.clone()),
        None => row.raw_chat.clone(),
    };
    let merged = ChatRow {
        id: row.id.clone(),
        name: row.name.clone(),
        raw_chat: merged_raw,
        updated_at: Utc::now(),
    };
    gateway.upsert_chat(&merged, force_name).await
}

fn shallow_merge(base: Json, patch: Json) -> Json {
    match (base, patch) {
        (Json::Object(mut base_map), Json::Object(patch_map)) => {
            for (k, v) in patch_map {
                base_map.insert(k, v);
            }
            Json::Object(base_map)
        }
        (_, patch) => patch,
    }
}
