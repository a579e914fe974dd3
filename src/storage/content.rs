use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection};

use super::schema::Database;
use super::types::{ContentItem, ContentItemRow, DatabaseError, CONTENT_ITEM_COLUMNS};
use crate::feed::ParsedItem;

/// Rows per multi-row INSERT; 7 binds per row.
const BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Content Operations
    // ========================================================================

    /// Insert content items for a feed, ignoring URLs already stored.
    ///
    /// Returns the number of rows actually inserted. Existing rows are never
    /// updated: content is captured once.
    pub async fn insert_content_items(
        &self,
        parent_id: i64,
        items: &[ParsedItem],
    ) -> Result<usize, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_content_items(&mut tx, parent_id, items).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Content of one feed, newest first; undated items last.
    pub async fn get_content_for_feed(
        &self,
        parent_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<ContentItem>, DatabaseError> {
        let rows: Vec<ContentItemRow> = sqlx::query_as(&format!(
            "SELECT {CONTENT_ITEM_COLUMNS} FROM content_items \
             WHERE parent_id = ? \
             ORDER BY published_at IS NULL, published_at DESC, id DESC \
             LIMIT ?"
        ))
        .bind(parent_id)
        .bind(limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ContentItemRow::into_content_item).collect())
    }

    /// One content item, addressed by its feed and its own id.
    pub async fn get_content_item(
        &self,
        parent_id: i64,
        content_id: i64,
    ) -> Result<Option<ContentItem>, DatabaseError> {
        let row: Option<ContentItemRow> = sqlx::query_as(&format!(
            "SELECT {CONTENT_ITEM_COLUMNS} FROM content_items WHERE parent_id = ? AND id = ?"
        ))
        .bind(parent_id)
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ContentItemRow::into_content_item))
    }

    /// Replace the stored body of one item, typically with the full article
    /// fetched from its page. Returns the updated item, or `None` if the
    /// feed has no such item.
    pub async fn set_content_body(
        &self,
        parent_id: i64,
        content_id: i64,
        content: &str,
    ) -> Result<Option<ContentItem>, DatabaseError> {
        let row: Option<ContentItemRow> = sqlx::query_as(&format!(
            "UPDATE content_items SET content = ? WHERE parent_id = ? AND id = ? \
             RETURNING {CONTENT_ITEM_COLUMNS}"
        ))
        .bind(content)
        .bind(parent_id)
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ContentItemRow::into_content_item))
    }

    /// Content across all of an owner's feeds published in `[start, end)`,
    /// newest first. Backs the daily digest.
    pub async fn get_content_published_between(
        &self,
        owner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>, DatabaseError> {
        let columns = CONTENT_ITEM_COLUMNS
            .split(", ")
            .map(|c| format!("c.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        let rows: Vec<ContentItemRow> = sqlx::query_as(&format!(
            "SELECT {columns} FROM content_items c \
             JOIN feed_sources f ON f.id = c.parent_id \
             WHERE f.owner_id = ? AND c.published_at >= ? AND c.published_at < ? \
             ORDER BY c.published_at DESC, c.id DESC"
        ))
        .bind(owner_id)
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ContentItemRow::into_content_item).collect())
    }
}

/// Conflict-ignoring bulk insert on an open transaction.
pub(crate) async fn insert_content_items(
    conn: &mut SqliteConnection,
    parent_id: i64,
    items: &[ParsedItem],
) -> Result<usize, DatabaseError> {
    let mut total_inserted: usize = 0;

    for chunk in items.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "INSERT INTO content_items \
             (parent_id, content_url, title, content, content_snippet, author, published_at) ",
        );

        builder.push_values(chunk, |mut b, item| {
            b.push_bind(parent_id)
                .push_bind(&item.content_url)
                .push_bind(&item.title)
                .push_bind(&item.content)
                .push_bind(&item.content_snippet)
                .push_bind(&item.author)
                .push_bind(item.published_at.map(|ts| ts.timestamp()));
        });
        builder.push(" ON CONFLICT(parent_id, content_url) DO NOTHING");

        let result = builder.build().execute(&mut *conn).await?;
        total_inserted += result.rows_affected() as usize;
    }

    Ok(total_inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FeedMetadata;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    async fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let source = db
            .upsert_feed_source("alice", "https://example.com/feed", FeedMetadata::default())
            .await
            .unwrap();
        (db, source.id)
    }

    fn item(url: &str, title: &str, day: Option<u32>) -> ParsedItem {
        ParsedItem {
            content_url: url.to_string(),
            title: Some(title.to_string()),
            content: Some(format!("<p>{title}</p>")),
            content_snippet: Some(title.to_string()),
            author: None,
            published_at: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 12, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_insert_counts_new_rows_only() {
        let (db, feed_id) = setup().await;

        let inserted = db
            .insert_content_items(feed_id, &[item("http://x/1", "One", Some(1)), item("http://x/2", "Two", Some(2))])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let inserted = db
            .insert_content_items(feed_id, &[item("http://x/2", "Two again", Some(2)), item("http://x/3", "Three", Some(3))])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_existing_content_never_overwritten() {
        let (db, feed_id) = setup().await;
        db.insert_content_items(feed_id, &[item("http://x/1", "Original", Some(1))])
            .await
            .unwrap();
        db.insert_content_items(feed_id, &[item("http://x/1", "Changed", Some(1))])
            .await
            .unwrap();

        let stored = db.get_content_for_feed(feed_id, None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title.as_deref(), Some("Original"));
    }

    #[tokio::test]
    async fn test_duplicates_within_one_batch() {
        let (db, feed_id) = setup().await;
        let inserted = db
            .insert_content_items(feed_id, &[item("http://x/1", "A", None), item("http://x/1", "B", None)])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn test_set_content_body_replaces_only_that_item() {
        let (db, feed_id) = setup().await;
        db.insert_content_items(feed_id, &[item("http://x/1", "One", Some(1)), item("http://x/2", "Two", Some(2))])
            .await
            .unwrap();
        let stored = db.get_content_for_feed(feed_id, None).await.unwrap();
        let target = stored.iter().find(|c| c.content_url == "http://x/1").unwrap();

        let updated = db
            .set_content_body(feed_id, target.id, "<article>Full</article>")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content.as_deref(), Some("<article>Full</article>"));
        assert_eq!(updated.content_snippet.as_deref(), Some("One"));

        let other = stored.iter().find(|c| c.content_url == "http://x/2").unwrap();
        let untouched = db.get_content_item(feed_id, other.id).await.unwrap().unwrap();
        assert_eq!(untouched.content.as_deref(), Some("<p>Two</p>"));
    }

    #[tokio::test]
    async fn test_content_item_scoped_to_its_feed() {
        let (db, feed_id) = setup().await;
        db.insert_content_items(feed_id, &[item("http://x/1", "One", None)])
            .await
            .unwrap();
        let id = db.get_content_for_feed(feed_id, None).await.unwrap()[0].id;

        assert!(db.get_content_item(feed_id, id).await.unwrap().is_some());
        assert_eq!(db.get_content_item(feed_id + 1, id).await.unwrap(), None);
        assert_eq!(db.set_content_body(feed_id + 1, id, "x").await.unwrap(), None);
        assert_eq!(db.set_content_body(feed_id, id + 100, "x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_spans_multiple_chunks() {
        let (db, feed_id) = setup().await;
        let items: Vec<ParsedItem> = (0..(BATCH_SIZE * 2 + 7))
            .map(|i| item(&format!("http://x/{i}"), "t", None))
            .collect();

        let inserted = db.insert_content_items(feed_id, &items).await.unwrap();
        assert_eq!(inserted, items.len());
        assert_eq!(db.insert_content_items(feed_id, &items).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_content_for_feed_order_and_limit() {
        let (db, feed_id) = setup().await;
        db.insert_content_items(
            feed_id,
            &[
                item("http://x/undated", "Undated", None),
                item("http://x/old", "Old", Some(1)),
                item("http://x/new", "New", Some(5)),
            ],
        )
        .await
        .unwrap();

        let titles: Vec<String> = db
            .get_content_for_feed(feed_id, None)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old", "Undated"]);

        let limited = db.get_content_for_feed(feed_id, Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(
            limited[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_published_between_scoped_to_owner() {
        let (db, feed_id) = setup().await;
        let other = db
            .upsert_feed_source("bob", "https://other.example/feed", FeedMetadata::default())
            .await
            .unwrap();

        db.insert_content_items(
            feed_id,
            &[
                item("http://x/1", "Day one", Some(1)),
                item("http://x/2", "Day two", Some(2)),
                item("http://x/3", "Undated", None),
            ],
        )
        .await
        .unwrap();
        db.insert_content_items(other.id, &[item("http://y/1", "Bob's", Some(2))])
            .await
            .unwrap();

        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let digest = db
            .get_content_published_between("alice", start, end)
            .await
            .unwrap();

        assert_eq!(digest.len(), 1);
        assert_eq!(digest[0].title.as_deref(), Some("Day two"));
        assert_eq!(digest[0].parent_id, feed_id);
    }
}
