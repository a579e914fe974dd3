use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for `feed_sources` queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedSourceRow {
    pub id: i64,
    pub owner_id: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub remote_url: Option<String>,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_error: Option<String>,
}

impl FeedSourceRow {
    pub(crate) fn into_feed_source(self) -> FeedSource {
        FeedSource {
            id: self.id,
            owner_id: self.owner_id,
            feed_url: self.feed_url,
            title: self.title,
            remote_url: self.remote_url,
            description: self.description,
            created_at: from_unix(self.created_at),
            updated_at: from_unix(self.updated_at),
            last_error: self.last_error,
        }
    }
}

/// Row type for `content_items` queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ContentItemRow {
    pub id: i64,
    pub parent_id: i64,
    pub content_url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_snippet: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<i64>,
}

impl ContentItemRow {
    pub(crate) fn into_content_item(self) -> ContentItem {
        ContentItem {
            id: self.id,
            parent_id: self.parent_id,
            content_url: self.content_url,
            title: self.title,
            content: self.content,
            content_snippet: self.content_snippet,
            author: self.author,
            published_at: self.published_at.map(from_unix),
        }
    }
}

/// Columns selected for [`FeedSourceRow`].
pub(crate) const FEED_SOURCE_COLUMNS: &str =
    "id, owner_id, feed_url, title, remote_url, description, created_at, updated_at, last_error";

/// Columns selected for [`ContentItemRow`].
pub(crate) const CONTENT_ITEM_COLUMNS: &str =
    "id, parent_id, content_url, title, content, content_snippet, author, published_at";

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered feed, unique per `(owner_id, feed_url)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSource {
    pub id: i64,
    pub owner_id: String,
    /// The URL the owner registered; used for every refetch.
    pub feed_url: String,
    pub title: Option<String>,
    /// Site link advertised by the feed itself.
    pub remote_url: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Touched on every successful ingest, even when nothing new arrived.
    pub updated_at: DateTime<Utc>,
    /// Message of the most recent failed refresh; cleared on success.
    pub last_error: Option<String>,
}

/// A stored content entry, unique per `(parent_id, content_url)`.
///
/// Written once on first capture and never overwritten by later ingests;
/// only a full-article fetch replaces `content`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    pub id: i64,
    pub parent_id: i64,
    pub content_url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_snippet: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Counts reported by one ingest of one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    /// Items the parser produced and submitted for insertion.
    pub items_fetched: usize,
    /// Items actually persisted; already-seen URLs are not counted.
    pub items_inserted: usize,
}
