// crates/db/src/lib.rs
//! The Store: durable relational + full-text backing for indexed
//! sessions. Owns schema, migrations, transactional upserts, and the
//! query primitives Query and the Indexer build on.

mod fts;
mod migrations;
mod store;

pub use fts::sanitize_fts_query;
pub use store::{SearchHit, Store, StoreError, StoreResult, SummaryStats, ToolStat};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to determine a default data directory")]
    NoCacheDir,

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// How many leading entries in `migrations::MIGRATIONS` make up the core
/// schema (sessions, tool_usage, file_tracking, fts_sessions plus their
/// indexes). A failure here is fatal; everything after is an optional,
/// best-effort addition (the hierarchy columns), matching the Store's
/// documented migration-failure taxonomy.
const CORE_MIGRATION_COUNT: usize = 8;

/// Main database handle: a pooled SQLite connection plus the path it was
/// opened from (empty for in-memory databases).
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("cache_size", "-65536") // at least 64 MiB, negative = KiB
            .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// In-memory database for tests. Uses `shared_cache` so every
    /// connection in the pool sees the same data.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open at the engine's configured default path.
    pub async fn open_default() -> DbResult<Self> {
        let path = default_db_path()?;
        Self::new(&path).await
    }

    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1;
            if version <= current_version {
                continue;
            }

            let result = sqlx::query(migration).execute(&self.pool).await.map(|_| ());
            match result {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column name") => {}
                Err(e) if version > CORE_MIGRATION_COUNT => {
                    warn!(error = %e, version, "optional migration failed, continuing with reduced features");
                }
                Err(e) => return Err(e.into()),
            }

            sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                .bind(version as i64)
                .execute(&self.pool)
                .await?;
        }

        if let Err(e) = self.backfill_subagent_columns().await {
            warn!(error = %e, "subagent backfill failed, continuing without it");
        }

        Ok(())
    }

    /// Derive `is_subagent`/`parent_id` for any session row whose
    /// `file_path` contains a `subagents` path segment but whose columns
    /// haven't been populated yet. Safe to run on every startup: once a
    /// row is backfilled it no longer matches the `WHERE` clause.
    async fn backfill_subagent_columns(&self) -> DbResult<()> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, file_path FROM sessions WHERE is_subagent = 0 AND file_path LIKE '%subagents%'",
        )
        .fetch_all(&self.pool)
        .await?;

        for (id, file_path) in rows {
            let identity = claude_index_core::identity::detect_subagent(Path::new(&file_path));
            if identity.is_subagent {
                sqlx::query(
                    "UPDATE sessions SET is_subagent = 1, parent_id = ? WHERE id = ?",
                )
                .bind(&identity.parent_id)
                .bind(&id)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// `<claude_home>/data/conversations.db`, honoring `CLAUDE_INDEX_DB_PATH`.
pub fn default_db_path() -> DbResult<PathBuf> {
    claude_index_core::paths::db_path().ok_or(DbError::NoCacheDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_database() {
        let db = Database::new_in_memory().await.expect("in-memory database");
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .expect("sessions table should exist");
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let db = Database::new_in_memory().await.expect("first open");
        db.run_migrations().await.expect("second run should not fail");
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_file_based_database() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.db");
        let db = Database::new(&db_path).await.expect("file-based database");
        assert!(db_path.exists());
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_hierarchy_columns_present() {
        let db = Database::new_in_memory().await.unwrap();
        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('sessions')")
                .fetch_all(db.pool())
                .await
                .unwrap();
        let names: Vec<&str> = columns.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"is_subagent"));
        assert!(names.contains(&"parent_id"));
        assert!(names.contains(&"cwd"));
    }
}
