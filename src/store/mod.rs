// src/store/mod.rs
// Cache store: schema creation, pool management, transaction scope.
//
// Two pools per the persisted-state layout (§6): `accounts.db` owns the
// accounts table exclusively; `cache.db` owns everything the sync layer
// reads and writes (users, chats, messages + FTS, sync state, sync jobs,
// rate limits, daemon status). Every sqlx query is written out at its
// call site rather than behind a query builder, matching the teacher's
// `cache/session_state_store.rs` / `project/tasks/store.rs` style.

pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Owns both SQLite pools for the daemon's lifetime. Handed to every
/// service as a cheap `Clone` (sqlx pools are `Arc`-backed internally).
#[derive(Clone)]
pub struct Store {
    pub accounts: SqlitePool,
    pub cache: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) both database files under `data_dir` and
    /// runs idempotent schema migration on each.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let accounts = open_pool(&data_dir.join("accounts.db")).await?;
        let cache = open_pool(&data_dir.join("cache.db")).await?;

        sqlx::raw_sql(schema::ACCOUNTS_SCHEMA)
            .execute(&accounts)
            .await
            .context("migrating accounts.db")?;
        sqlx::raw_sql(schema::CACHE_SCHEMA)
            .execute(&cache)
            .await
            .context("migrating cache.db")?;

        info!(path = %data_dir.display(), "store opened and migrated");

        Ok(Self { accounts, cache })
    }

    /// In-memory store for tests: each call gets two fresh, independent
    /// SQLite databases with schema applied.
    pub async fn open_in_memory() -> Result<Self> {
        let accounts = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let cache = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::raw_sql(schema::ACCOUNTS_SCHEMA).execute(&accounts).await?;
        sqlx::raw_sql(schema::CACHE_SCHEMA).execute(&cache).await?;

        Ok(Self { accounts, cache })
    }
}

async fn open_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("opening {}", path.display()))?;

    Ok(pool)
}

/// Current epoch seconds, the timestamp unit used throughout the schema.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Escapes an FTS5 query so no input character receives special meaning
/// (§4.1 search contract). FTS5 treats a double-quoted string as a single
/// literal token/phrase; we escape embedded quotes by doubling them, which
/// neutralizes hyphen, asterisk, parentheses, and quote alike since none
/// of them are parsed inside a quoted phrase.
pub fn escape_fts_query(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}
