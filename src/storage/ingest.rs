use super::content::insert_content_items;
use super::feeds::{upsert_feed_source, FeedMetadata};
use super::schema::Database;
use super::types::{DatabaseError, FeedSource, UpsertOutcome};
use crate::feed::ParsedFeed;

impl Database {
    /// Persist one parsed feed for an owner in a single transaction.
    ///
    /// The feed source is inserted or has its metadata refreshed (this runs
    /// even when the feed carries no items), then every item is offered to a
    /// conflict-ignoring insert. Returns the stored source and how many items
    /// were submitted versus actually new.
    pub async fn apply_parsed_feed(
        &self,
        owner_id: &str,
        feed_url: &str,
        feed: &ParsedFeed,
    ) -> Result<(FeedSource, UpsertOutcome), DatabaseError> {
        let metadata = FeedMetadata {
            title: feed.title.as_deref(),
            remote_url: feed.link.as_deref(),
            description: feed.description.as_deref(),
        };

        let mut tx = self.pool.begin().await?;
        let source = upsert_feed_source(&mut tx, owner_id, feed_url, metadata).await?;
        let items_inserted = insert_content_items(&mut tx, source.id, &feed.items).await?;
        tx.commit().await?;

        let outcome = UpsertOutcome {
            items_fetched: feed.items.len(),
            items_inserted,
        };
        tracing::debug!(
            feed_id = source.id,
            feed = %feed_url,
            fetched = outcome.items_fetched,
            inserted = outcome.items_inserted,
            "Applied parsed feed"
        );
        Ok((source, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{parse_feed, FeedFormat, ParsedItem};
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<rss version="2.0"><channel>
<title>Example</title><link>https://example.com/</link>
<item><title>One</title><link>https://example.com/1</link></item>
<item><title>Two</title><link>https://example.com/2</link></item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        let feed = parse_feed(RSS).unwrap();

        let (source, first) = db
            .apply_parsed_feed("alice", "https://example.com/feed", &feed)
            .await
            .unwrap();
        assert_eq!(source.title.as_deref(), Some("Example"));
        assert_eq!(source.remote_url.as_deref(), Some("https://example.com/"));
        assert_eq!(first, UpsertOutcome { items_fetched: 2, items_inserted: 2 });

        let (again, second) = db
            .apply_parsed_feed("alice", "https://example.com/feed", &feed)
            .await
            .unwrap();
        assert_eq!(again.id, source.id);
        assert_eq!(second, UpsertOutcome { items_fetched: 2, items_inserted: 0 });
        assert_eq!(db.get_content_for_feed(source.id, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_feed_still_registers_source() {
        let db = Database::open(":memory:").await.unwrap();
        let mut feed = ParsedFeed::empty(FeedFormat::Atom);
        feed.title = Some("Quiet".into());

        let (source, outcome) = db
            .apply_parsed_feed("alice", "https://quiet.example/feed", &feed)
            .await
            .unwrap();
        assert_eq!(source.title.as_deref(), Some("Quiet"));
        assert_eq!(outcome, UpsertOutcome::default());
        assert_eq!(db.get_feed_sources_for_owner("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_clears_removed_description() {
        let db = Database::open(":memory:").await.unwrap();
        let mut v1 = ParsedFeed::empty(FeedFormat::Rss2);
        v1.title = Some("Example".into());
        v1.description = Some("Old desc".into());
        db.apply_parsed_feed("alice", "https://example.com/feed", &v1)
            .await
            .unwrap();

        let mut v2 = ParsedFeed::empty(FeedFormat::Rss2);
        v2.title = Some("Example".into());
        let (source, _) = db
            .apply_parsed_feed("alice", "https://example.com/feed", &v2)
            .await
            .unwrap();
        assert_eq!(source.description, None);
        assert_eq!(source.title.as_deref(), Some("Example"));
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_metadata() {
        let db = Database::open(":memory:").await.unwrap();
        let mut feed = ParsedFeed::empty(FeedFormat::Rss2);
        // Bypasses the parser to trip the CHECK constraint.
        feed.items.push(ParsedItem {
            content_url: String::new(),
            title: None,
            content: None,
            content_snippet: None,
            author: None,
            published_at: None,
        });

        let result = db
            .apply_parsed_feed("alice", "https://broken.example/feed", &feed)
            .await;
        assert!(result.is_err());
        assert!(db.get_feed_sources_for_owner("alice").await.unwrap().is_empty());
    }
}
