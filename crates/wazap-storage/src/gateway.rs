//! Typed CRUD + bulk operations over the relational store, owning the
//! bounded connection pool (spec §4.A).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as Json;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySql, MySqlPool, Row, Transaction};
use tracing::{debug, warn};

use crate::error::{Result, StorageError};
use crate::schema;

/// Per-statement cap for the in-transaction sender-id rewrite triggered by a
/// lid's first jid resolution. Keeps a contact with a very long history from
/// holding the mapping-upsert transaction open for an unbounded UPDATE.
const RECONCILE_TX_BATCH_LIMIT: i64 = 500;

/// Everything the gateway needs to open and bound its pool. Mirrors
/// `wazap_core::config::StorageConfig` without creating a dependency cycle
/// (the binary passes the fields across the boundary).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: u32,
    pub slow_query_threshold_ms: u64,
}

/// Owns the bounded `sqlx` connection pool and exposes a narrow typed API.
/// Every other component in the workspace reaches the store only through
/// this type.
pub struct Gateway {
    pool: MySqlPool,
    slow_query_threshold_ms: u64,
    shutting_down: AtomicBool,
}

impl Gateway {
    /// Connect, create the database and core tables if absent, and return a
    /// gateway ready to serve traffic. UTC and the connection charset are
    /// pinned on every pooled connection via `after_connect`.
    pub async fn connect(config: &GatewayConfig) -> Result<Self> {
        let admin_options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password);

        let admin_pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(admin_options.clone())
            .await?;
        schema::ensure_database(&admin_pool, &config.database).await?;
        admin_pool.close().await;

        let scoped_options = admin_options.database(&config.database);
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET time_zone = '+00:00'")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("SET NAMES utf8mb4")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(scoped_options)
            .await?;

        schema::ensure_tables(&pool).await?;

        Ok(Self {
            pool,
            slow_query_threshold_ms: config.slow_query_threshold_ms,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Close the pool. Acquisitions attempted afterward return
    /// `StorageError::ShuttingDown` rather than hanging.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.pool.close().await;
    }

    fn check_shutdown(&self) -> Result<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(StorageError::ShuttingDown);
        }
        Ok(())
    }

    /// Time a query and log it with structured fields when it exceeds the
    /// configured slow-query threshold.
    fn record_slow(&self, sql_shape: &str, caller_tag: &str, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms >= self.slow_query_threshold_ms {
            warn!(
                sql_shape,
                caller_tag,
                duration_ms = elapsed_ms,
                "slow query"
            );
        } else {
            debug!(sql_shape, caller_tag, duration_ms = elapsed_ms, "query");
        }
    }

    /// Acquire a connection, begin a transaction, run `f`, commit on
    /// success, roll back on any error, and always release the connection.
    pub async fn with_transaction<'a, F, Fut, T>(&'a self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'a, MySql>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.check_shutdown()?;
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                // Rollback happens implicitly on Transaction drop if commit
                // is never called; calling it explicitly surfaces rollback
                // errors instead of hiding them.
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after transaction error");
                }
                Err(e)
            }
        }
    }

    /// Raw parametrized query escape hatch for callers with bespoke SQL
    /// (e.g. the identity reconciliation sweep). `params` are bound in
    /// order as strings — sufficient for this workspace's id/text columns.
    pub async fn execute_query(&self, sql: &str, params: &[&str], caller_tag: &str) -> Result<u64> {
        self.check_shutdown()?;
        let started = Instant::now();
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(*p);
        }
        let result = query.execute(&self.pool).await?;
        self.record_slow(sql, caller_tag, started);
        Ok(result.rows_affected())
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    // ---- messages -----------------------------------------------------

    pub async fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.check_shutdown()?;
        let started = Instant::now();
        sqlx::query(
            "INSERT INTO messages (chat_id, message_id, sender_id, content, raw_message, `timestamp`, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                sender_id = VALUES(sender_id),
                content = VALUES(content),
                raw_message = VALUES(raw_message),
                `timestamp` = VALUES(`timestamp`)",
        )
        .bind(&row.chat_id)
        .bind(&row.message_id)
        .bind(&row.sender_id)
        .bind(&row.content)
        .bind(row.raw_message.to_string())
        .bind(row.timestamp)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        self.record_slow("INSERT messages", "write_queue.insert_message", started);
        Ok(())
    }

    pub async fn find_message(&self, chat_id: &str, message_id: &str) -> Result<Option<MessageRow>> {
        self.check_shutdown()?;
        let row = sqlx::query(
            "SELECT chat_id, message_id, sender_id, content, raw_message, `timestamp`, created_at
             FROM messages WHERE chat_id = ? AND message_id = ?",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn find_messages_by_chat(&self, chat_id: &str, limit: i64) -> Result<Vec<MessageRow>> {
        self.check_shutdown()?;
        let rows = sqlx::query(
            "SELECT chat_id, message_id, sender_id, content, raw_message, `timestamp`, created_at
             FROM messages WHERE chat_id = ? ORDER BY `timestamp` DESC LIMIT ?",
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Paginated scan over every stored message, oldest first. Used by the
    /// identity backfill sweep to mine `participantAlt` fields out of
    /// `raw_message` without needing to know chat ids up front.
    pub async fn scan_messages(&self, limit: i64, offset: i64) -> Result<Vec<MessageRow>> {
        self.check_shutdown()?;
        let rows = sqlx::query(
            "SELECT chat_id, message_id, sender_id, content, raw_message, `timestamp`, created_at
             FROM messages ORDER BY created_at LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Rewrite `sender_id` on every message with `from_sender_id` in a
    /// single statement, inside the caller's transaction. Used by the
    /// identity reconciliation sweep.
    pub async fn rewrite_message_sender_tx(
        tx: &mut Transaction<'_, MySql>,
        from_sender_id: &str,
        to_sender_id: &str,
        batch_limit: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET sender_id = ? WHERE sender_id = ? LIMIT ?",
        )
        .bind(to_sender_id)
        .bind(from_sender_id)
        .bind(batch_limit)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    // ---- chats ----------------------------------------------------------

    pub async fn upsert_chat(&self, row: &ChatRow, force_name: bool) -> Result<()> {
        self.check_shutdown()?;
        let started = Instant::now();
        if force_name {
            sqlx::query(
                "INSERT INTO chats (id, name, raw_chat, updated_at) VALUES (?, ?, ?, ?)
                 ON DUPLICATE KEY UPDATE name = VALUES(name), raw_chat = VALUES(raw_chat), updated_at = VALUES(updated_at)",
            )
            .bind(&row.id)
            .bind(&row.name)
            .bind(row.raw_chat.to_string())
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
        } else {
            // Partial upsert: never clobber an existing name with NULL.
            sqlx::query(
                "INSERT INTO chats (id, name, raw_chat, updated_at) VALUES (?, ?, ?, ?)
                 ON DUPLICATE KEY UPDATE
                    name = COALESCE(VALUES(name), name),
                    raw_chat = VALUES(raw_chat),
                    updated_at = VALUES(updated_at)",
            )
            .bind(&row.id)
            .bind(&row.name)
            .bind(row.raw_chat.to_string())
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
        }
        self.record_slow("UPSERT chats", "write_queue.upsert_chat", started);
        Ok(())
    }

    pub async fn find_chat(&self, id: &str) -> Result<Option<ChatRow>> {
        self.check_shutdown()?;
        let row = sqlx::query("SELECT id, name, raw_chat, updated_at FROM chats WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn remove_chat(&self, id: &str) -> Result<()> {
        self.check_shutdown()?;
        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Every stored chat id that looks like a group (`@g.us` suffix). Used
    /// to seed the group-metadata preload on a fresh `connection: open`
    /// without needing a separate "known groups" table.
    pub async fn list_group_chat_ids(&self) -> Result<Vec<String>> {
        self.check_shutdown()?;
        let rows = sqlx::query("SELECT id FROM chats WHERE id LIKE '%@g.us'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    // ---- groups metadata --------------------------------------------------

    pub async fn upsert_group_metadata(&self, row: &GroupMetadataRow) -> Result<()> {
        self.check_shutdown()?;
        let started = Instant::now();
        sqlx::query(
            "INSERT INTO groups_metadata (id, subject, description, owner, creation, participants, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                subject = VALUES(subject), description = VALUES(description),
                owner = VALUES(owner), creation = VALUES(creation),
                participants = VALUES(participants), updated_at = VALUES(updated_at)",
        )
        .bind(&row.id)
        .bind(&row.subject)
        .bind(&row.description)
        .bind(&row.owner)
        .bind(row.creation)
        .bind(row.participants.to_string())
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        self.record_slow("UPSERT groups_metadata", "groups.upsert", started);
        Ok(())
    }

    pub async fn find_group_metadata(&self, id: &str) -> Result<Option<GroupMetadataRow>> {
        self.check_shutdown()?;
        let row = sqlx::query(
            "SELECT id, subject, description, owner, creation, participants, updated_at
             FROM groups_metadata WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    // ---- identity mapping --------------------------------------------------

    /// Insert-if-absent; otherwise update `jid` only when the new value is
    /// non-null, advance `last_seen`, and update `source`. Never lets a
    /// known `jid` be overwritten by null.
    pub async fn upsert_identity_mapping(
        &self,
        lid: &str,
        jid: Option<&str>,
        seen_at: DateTime<Utc>,
        source: &str,
    ) -> Result<()> {
        self.check_shutdown()?;
        let started = Instant::now();
        sqlx::query(
            "INSERT INTO lid_map (lid, jid, first_seen, last_seen, source)
             VALUES (?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                jid = COALESCE(VALUES(jid), jid),
                last_seen = VALUES(last_seen),
                source = VALUES(source)",
        )
        .bind(lid)
        .bind(jid)
        .bind(seen_at)
        .bind(seen_at)
        .bind(source)
        .execute(&self.pool)
        .await?;
        self.record_slow("UPSERT lid_map", "identity.upsert_mapping", started);
        Ok(())
    }

    /// Same insert-or-merge as [`Self::upsert_identity_mapping`], but when
    /// this sighting is the lid's *first* resolution to a non-null jid, also
    /// rewrites historical `messages.sender_id` from lid-form to jid-form in
    /// the same transaction as the mapping write (spec §4.D: the
    /// reconciliation sweep runs "within the same transaction as the mapping
    /// upsert", not just in the boot-time backfill sweep). Returns the
    /// number of message rows rewritten (0 when this wasn't a first
    /// resolution).
    pub async fn upsert_identity_mapping_with_reconcile(
        &self,
        lid: &str,
        jid: Option<&str>,
        seen_at: DateTime<Utc>,
        source: &str,
    ) -> Result<u64> {
        self.check_shutdown()?;
        let lid = lid.to_string();
        let jid = jid.map(|j| j.to_string());
        let source = source.to_string();
        self.with_transaction(|tx| {
            let lid = lid.clone();
            let jid = jid.clone();
            let source = source.clone();
            async move {
                let existing = sqlx::query("SELECT jid FROM lid_map WHERE lid = ? FOR UPDATE")
                    .bind(&lid)
                    .fetch_optional(&mut **tx)
                    .await?;
                let previously_null = match &existing {
                    Some(row) => row.get::<Option<String>, _>("jid").is_none(),
                    None => true,
                };

                sqlx::query(
                    "INSERT INTO lid_map (lid, jid, first_seen, last_seen, source)
                     VALUES (?, ?, ?, ?, ?)
                     ON DUPLICATE KEY UPDATE
                        jid = COALESCE(VALUES(jid), jid),
                        last_seen = VALUES(last_seen),
                        source = VALUES(source)",
                )
                .bind(&lid)
                .bind(&jid)
                .bind(seen_at)
                .bind(seen_at)
                .bind(&source)
                .execute(&mut **tx)
                .await?;

                let first_resolution = previously_null
                    && jid.as_deref().is_some_and(|j| j != lid);
                if !first_resolution {
                    return Ok(0u64);
                }
                let to = jid.unwrap();

                let mut rewritten = 0u64;
                loop {
                    let affected =
                        Self::rewrite_message_sender_tx(tx, &lid, &to, RECONCILE_TX_BATCH_LIMIT)
                            .await?;
                    rewritten += affected;
                    if affected < RECONCILE_TX_BATCH_LIMIT as u64 {
                        break;
                    }
                }
                Ok(rewritten)
            }
        })
        .await
    }

    pub async fn find_identity_mapping(&self, lid: &str) -> Result<Option<IdentityMappingRow>> {
        self.check_shutdown()?;
        let row = sqlx::query(
            "SELECT lid, jid, first_seen, last_seen, source FROM lid_map WHERE lid = ?",
        )
        .bind(lid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn list_identity_mappings(&self, limit: i64, offset: i64) -> Result<Vec<IdentityMappingRow>> {
        self.check_shutdown()?;
        let rows = sqlx::query(
            "SELECT lid, jid, first_seen, last_seen, source FROM lid_map ORDER BY first_seen LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    // ---- group configs ------------------------------------------------------

    pub async fn find_group_config(&self, id: &str) -> Result<Option<Json>> {
        self.check_shutdown()?;
        let row = sqlx::query("SELECT config FROM group_configs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => {
                let raw: String = r.get(0);
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    pub async fn upsert_group_config(&self, id: &str, config: &Json) -> Result<()> {
        self.check_shutdown()?;
        sqlx::query(
            "INSERT INTO group_configs (id, config) VALUES (?, ?)
             ON DUPLICATE KEY UPDATE config = VALUES(config)",
        )
        .bind(id)
        .bind(config.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Locks the row for `id` (creating it with `Json::Null` first if
    /// absent), runs `f` over the current value, and writes back whatever
    /// it returns, all inside one transaction. Callers that read-modify-write
    /// group configuration under concurrent admin commands need this rather
    /// than the plain find/upsert pair, which would lose writes under a race.
    pub async fn transact_group_config<F>(&self, id: &str, f: F) -> Result<Json>
    where
        F: FnOnce(Option<Json>) -> Json,
    {
        self.check_shutdown()?;
        self.with_transaction(|tx| async move {
            sqlx::query("INSERT IGNORE INTO group_configs (id, config) VALUES (?, ?)")
                .bind(id)
                .bind(Json::Null.to_string())
                .execute(&mut **tx)
                .await?;

            let row = sqlx::query("SELECT config FROM group_configs WHERE id = ? FOR UPDATE")
                .bind(id)
                .fetch_one(&mut **tx)
                .await?;
            let raw: String = row.get(0);
            let current: Json = serde_json::from_str(&raw)?;
            let current = if current.is_null() { None } else { Some(current) };

            let updated = f(current);
            sqlx::query("UPDATE group_configs SET config = ? WHERE id = ?")
                .bind(updated.to_string())
                .bind(id)
                .execute(&mut **tx)
                .await?;

            Ok(updated)
        })
        .await
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub chat_id: String,
    pub message_id: String,
    pub sender_id: String,
    pub content: String,
    pub raw_message: Json,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<sqlx::mysql::MySqlRow> for MessageRow {
    type Error = StorageError;

    fn try_from(row: sqlx::mysql::MySqlRow) -> Result<Self> {
        let raw: String = row.get("raw_message");
        Ok(Self {
            chat_id: row.get("chat_id"),
            message_id: row.get("message_id"),
            sender_id: row.get("sender_id"),
            content: row.get("content"),
            raw_message: serde_json::from_str(&raw)?,
            timestamp: row.get("timestamp"),
            created_at: row.get("created_at"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: String,
    pub name: Option<String>,
    pub raw_chat: Json,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<sqlx::mysql::MySqlRow> for ChatRow {
    type Error = StorageError;

    fn try_from(row: sqlx::mysql::MySqlRow) -> Result<Self> {
        let raw: String = row.get("raw_chat");
        Ok(Self {
            id: row.get("id"),
            name: row.get("name"),
            raw_chat: serde_json::from_str(&raw)?,
            updated_at: row.get("updated_at"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupMetadataRow {
    pub id: String,
    pub subject: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub creation: Option<DateTime<Utc>>,
    pub participants: Json,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<sqlx::mysql::MySqlRow> for GroupMetadataRow {
    type Error = StorageError;

    fn try_from(row: sqlx::mysql::MySqlRow) -> Result<Self> {
        let raw: String = row.get("participants");
        Ok(Self {
            id: row.get("id"),
            subject: row.get("subject"),
            description: row.get("description"),
            owner: row.get("owner"),
            creation: row.get("creation"),
            participants: serde_json::from_str(&raw)?,
            updated_at: row.get("updated_at"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct IdentityMappingRow {
    pub lid: String,
    pub jid: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub source: String,
}

impl TryFrom<sqlx::mysql::MySqlRow> for IdentityMappingRow {
    type Error = StorageError;

    fn try_from(row: sqlx::mysql::MySqlRow) -> Result<Self> {
        Ok(Self {
            lid: row.get("lid"),
            jid: row.get("jid"),
            first_seen: row.get("first_seen"),
            last_seen: row.get("last_seen"),
            source: row.get("source"),
        })
    }
}
