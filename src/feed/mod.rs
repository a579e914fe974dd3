//! Feed ingestion: fetching, dialect detection, parsing and refresh.
//!
//! - **Parsing**: RSS 2.0, Atom and RSS 1.0/RDF normalized into one
//!   [`ParsedFeed`] shape by pure functions over a tolerant XML tree
//! - **Fetching**: bounded HTTP retrieval with typed failures
//! - **Ingestion**: the single-feed add and refresh paths
//! - **Batch refresh**: every feed of an owner, one failure never stopping
//!   the rest
//! - **Full articles**: an item's page fetched and reduced to its main content
//!
//! # Architecture
//!
//! - [`xml`] - tolerant tree built from `quick-xml` events, plus the
//!   [`FieldTags`] table each dialect resolves fields through
//! - `detect` - substring-based dialect classification
//! - `rss`, `atom`, `rdf` - the three dialect extractors
//! - `parser` - the [`parse_feed`] entry point and shared output types
//! - `fetcher` - [`fetch_feed`], [`FetchOptions`] and the redirect-checking
//!   [`build_client`]
//! - `ingest` - [`add_feed`] and [`refresh_feed`]
//! - `refresh` - [`refresh_all`]
//! - `article` - [`fetch_full_content`] and [`extract_main_content`]
//!
//! # Example
//!
//! ```no_run
//! use feedmill::feed::{add_feed, build_client, refresh_all, FetchOptions};
//! use feedmill::storage::Database;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open("feeds.db").await?;
//! let opts = FetchOptions::default();
//! let client = build_client(&opts)?;
//!
//! add_feed(&db, &client, &opts, "alice", "https://example.com/feed.xml").await?;
//! let report = refresh_all(&db, &client, &opts, "alice", None).await?;
//! println!("{} of {} feeds refreshed", report.success_count, report.results.len());
//! # Ok(())
//! # }
//! ```

mod article;
mod atom;
mod detect;
mod fetcher;
mod ingest;
mod parser;
mod rdf;
mod refresh;
mod rss;
pub mod xml;

pub use article::{extract_main_content, fetch_full_content, ArticleError};
pub use detect::{detect_format, FeedFormat};
pub use fetcher::{
    build_client, fetch_feed, redirect_policy, FetchError, FetchOptions, FetchedFeed,
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_FEED_BYTES, MAX_REDIRECTS,
};
pub use ingest::{add_feed, refresh_feed, IngestError};
pub use parser::{parse_feed, FeedParseError, ParsedFeed, ParsedItem};
pub use refresh::{refresh_all, FeedRefreshResult, RefreshEvent, RefreshReport};
pub use xml::FieldTags;
