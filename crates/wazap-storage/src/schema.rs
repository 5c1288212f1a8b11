//! Boot-time schema management: create the database if absent, then the
//! core tables and their indices (spec §6). Runs once, before the event
//! router subscribes to anything.

use sqlx::MySqlPool;
use tracing::info;

use crate::error::Result;

/// `CREATE DATABASE IF NOT EXISTS` against a connection that is not yet
/// scoped to `database`, then `CREATE TABLE IF NOT EXISTS` for every core
/// and auxiliary table. Idempotent — safe to run on every boot.
pub async fn ensure_database(admin_pool: &MySqlPool, database: &str) -> Result<()> {
    let stmt = format!(
        "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
        database
    );
    sqlx::query(&stmt).execute(admin_pool).await?;
    info!(database, "database ensured");
    Ok(())
}

/// Create the core and auxiliary tables plus their indices. Safe to call
/// repeatedly (`IF NOT EXISTS` throughout).
pub async fn ensure_tables(pool: &MySqlPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            chat_id      VARCHAR(191) NOT NULL,
            message_id   VARCHAR(191) NOT NULL,
            sender_id    VARCHAR(191) NOT NULL,
            content      TEXT NOT NULL,
            raw_message  JSON NOT NULL,
            `timestamp`  DATETIME(3) NOT NULL,
            created_at   DATETIME(3) NOT NULL,
            PRIMARY KEY (chat_id, message_id)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    create_index_if_absent(
        pool,
        "CREATE INDEX idx_messages_chat_timestamp ON messages (chat_id, `timestamp`)",
    )
    .await?;
    create_index_if_absent(
        pool,
        "CREATE INDEX idx_messages_sender ON messages (sender_id)",
    )
    .await?;
    create_index_if_absent(
        pool,
        "CREATE INDEX idx_messages_timestamp ON messages (`timestamp`)",
    )
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chats (
            id          VARCHAR(191) PRIMARY KEY,
            name        VARCHAR(512),
            raw_chat    JSON NOT NULL,
            updated_at  DATETIME(3) NOT NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups_metadata (
            id            VARCHAR(191) PRIMARY KEY,
            subject       VARCHAR(512) NOT NULL,
            description   TEXT,
            owner         VARCHAR(191),
            creation      DATETIME(3),
            participants  JSON NOT NULL,
            updated_at    DATETIME(3) NOT NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lid_map (
            lid         VARCHAR(191) PRIMARY KEY,
            jid         VARCHAR(191),
            first_seen  DATETIME(3) NOT NULL,
            last_seen   DATETIME(3) NOT NULL,
            source      VARCHAR(32) NOT NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    create_index_if_absent(pool, "CREATE INDEX idx_lid_map_jid ON lid_map (jid)").await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS group_configs (
            id      VARCHAR(191) PRIMARY KEY,
            config  JSON NOT NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    // Reserved key for process-wide sets (e.g. premium users) — lives as a
    // row in the same table, keyed by a value no real group id can take.
    sqlx::query(
        "INSERT IGNORE INTO group_configs (id, config) VALUES ('__global__', JSON_OBJECT())",
    )
    .execute(pool)
    .await?;

    info!("core schema ensured");
    Ok(())
}

/// MySQL has no `CREATE INDEX IF NOT EXISTS`; treat a duplicate-key-name
/// error as success rather than failing boot on a re-run.
async fn create_index_if_absent(pool: &MySqlPool, stmt: &str) -> Result<()> {
    match sqlx::query(stmt).execute(pool).await {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(ref db_err)) if db_err.message().contains("Duplicate key name") => {
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
