use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::types::{DatabaseError, FeedSource, FeedSourceRow, FEED_SOURCE_COLUMNS};

/// Feed-level metadata written on every successful ingest.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedMetadata<'a> {
    pub title: Option<&'a str>,
    pub remote_url: Option<&'a str>,
    pub description: Option<&'a str>,
}

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Insert a feed source or refresh the metadata of an existing one.
    ///
    /// Keyed on `(owner_id, feed_url)`: `id` and `created_at` of an existing
    /// row are never touched, `updated_at` always is, and `last_error` is
    /// cleared. Metadata is replaced as given, so a field the feed no longer
    /// publishes is cleared.
    pub async fn upsert_feed_source(
        &self,
        owner_id: &str,
        feed_url: &str,
        metadata: FeedMetadata<'_>,
    ) -> Result<FeedSource, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let source = upsert_feed_source(&mut tx, owner_id, feed_url, metadata).await?;
        tx.commit().await?;
        Ok(source)
    }

    /// All feed sources of an owner, in registration order.
    pub async fn get_feed_sources_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<FeedSource>, DatabaseError> {
        let rows: Vec<FeedSourceRow> = sqlx::query_as(&format!(
            "SELECT {FEED_SOURCE_COLUMNS} FROM feed_sources WHERE owner_id = ? ORDER BY id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedSourceRow::into_feed_source).collect())
    }

    pub async fn get_feed_source(&self, id: i64) -> Result<Option<FeedSource>, DatabaseError> {
        let row: Option<FeedSourceRow> = sqlx::query_as(&format!(
            "SELECT {FEED_SOURCE_COLUMNS} FROM feed_sources WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedSourceRow::into_feed_source))
    }

    /// Record (or clear, with `None`) the last refresh error of one feed.
    pub async fn set_feed_error(&self, feed_id: i64, error: Option<&str>) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feed_sources SET last_error = ? WHERE id = ?")
            .bind(error)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Batch update last_error for multiple feeds in a single statement.
    ///
    /// `None` clears a feed's error.
    pub async fn batch_set_feed_errors(
        &self,
        updates: &[(i64, Option<String>)],
    ) -> Result<(), DatabaseError> {
        if updates.is_empty() {
            return Ok(());
        }

        // Build: UPDATE feed_sources SET last_error = CASE id
        //            WHEN 1 THEN 'error1'
        //            WHEN 2 THEN NULL
        //        END
        //        WHERE id IN (1, 2)
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE feed_sources SET last_error = CASE id ");

        for (feed_id, error) in updates {
            builder.push("WHEN ");
            builder.push_bind(*feed_id);
            builder.push(" THEN ");
            builder.push_bind(error.as_deref());
            builder.push(" ");
        }

        builder.push("END WHERE id IN (");
        let mut separated = builder.separated(", ");
        for (feed_id, _) in updates {
            separated.push_bind(*feed_id);
        }
        separated.push_unseparated(")");

        let mut tx = self.pool.begin().await?;
        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }
}

/// Metadata upsert on an open transaction; see [`Database::upsert_feed_source`].
pub(crate) async fn upsert_feed_source(
    conn: &mut SqliteConnection,
    owner_id: &str,
    feed_url: &str,
    metadata: FeedMetadata<'_>,
) -> Result<FeedSource, DatabaseError> {
    let now = chrono::Utc::now().timestamp();

    let row: FeedSourceRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO feed_sources (owner_id, feed_url, title, remote_url, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(owner_id, feed_url) DO UPDATE SET
            title = excluded.title,
            remote_url = excluded.remote_url,
            description = excluded.description,
            updated_at = excluded.updated_at,
            last_error = NULL
        RETURNING {FEED_SOURCE_COLUMNS}
        "#
    ))
    .bind(owner_id)
    .bind(feed_url)
    .bind(metadata.title)
    .bind(metadata.remote_url)
    .bind(metadata.description)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into_feed_source())
}
