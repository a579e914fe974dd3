//! SQLite persistence for feed sources and their content.
//!
//! Two tables carry the whole model: `feed_sources`, unique per
//! `(owner_id, feed_url)`, and `content_items`, unique per
//! `(parent_id, content_url)`. Those constraints are the only deduplication
//! mechanism; every write path relies on `ON CONFLICT` rather than
//! read-then-write checks.

mod content;
mod feeds;
mod ingest;
mod schema;
mod types;

pub use feeds::FeedMetadata;
pub use schema::Database;
pub use types::{ContentItem, DatabaseError, FeedSource, UpsertOutcome};
