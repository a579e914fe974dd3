use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// `path` is a file path or `:memory:` for a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if the schema could not be applied.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: Pre-create the database file owner-only so there is no
        // window where it exists with default umask permissions.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if db_path.parent().is_some_and(|p| p.as_os_str().is_empty() || p.exists()) {
                use std::os::unix::fs::OpenOptionsExt;
                // If creation fails, SQLite reports the error at connect_with.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        // busy_timeout=5000: wait up to 5 seconds for locks before SQLITE_BUSY.
        // Set through pragma() so every pooled connection inherits it.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; 5 connections covers a bounded refresh
        // pipeline plus readers.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let message = e.to_string();
            if is_lock_message(&message) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(message)
            }
        })?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Natural key: one registration per owner and URL.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_sources (
                id INTEGER PRIMARY KEY,
                owner_id TEXT NOT NULL,
                feed_url TEXT NOT NULL,
                title TEXT,
                remote_url TEXT,
                description TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_error TEXT,
                UNIQUE(owner_id, feed_url)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Dedup key: one row per feed and content URL. The CHECK backs the
        // parser's guarantee that every item has a URL.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_items (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES feed_sources(id) ON DELETE CASCADE,
                content_url TEXT NOT NULL CHECK (content_url <> ''),
                title TEXT,
                content TEXT,
                content_snippet TEXT,
                author TEXT,
                published_at INTEGER,
                UNIQUE(parent_id, content_url)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // get_content_for_feed(): filter by parent, newest first
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_items_parent_published ON content_items(parent_id, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        // get_content_published_between(): range scan on publication time
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_items_published ON content_items(published_at)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
