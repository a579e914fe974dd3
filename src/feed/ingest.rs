use thiserror::Error;

use super::fetcher::{fetch_feed, FetchError, FetchOptions};
use super::parser::{parse_feed, FeedParseError};
use crate::storage::{Database, DatabaseError, FeedSource, UpsertOutcome};
use crate::util::{validate_feed_url, UrlValidationError};

/// Everything that can stop a single feed from being ingested.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] UrlValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Parse error: {0}")]
    Parse(#[from] FeedParseError),
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl IngestError {
    /// The remote side failed: unreachable, slow, non-2xx or oversized.
    pub fn is_network(&self) -> bool {
        matches!(self, IngestError::Fetch(_))
    }

    /// The caller supplied a URL that was rejected before any fetch.
    pub fn is_validation(&self) -> bool {
        matches!(self, IngestError::Validation(_))
    }
}

/// Registers a feed for an owner: validate, fetch, parse, upsert.
///
/// Adding a URL the owner already has is not an error; it behaves like a
/// refresh of that source. The first failing stage is returned as is.
///
/// # Errors
///
/// - [`IngestError::Validation`] - the URL was rejected; nothing was fetched
/// - [`IngestError::Fetch`] - network, HTTP status, timeout or size failure
/// - [`IngestError::Parse`] - the body contained no XML document
/// - [`IngestError::Storage`] - the upsert transaction failed
pub async fn add_feed(
    db: &Database,
    client: &reqwest::Client,
    opts: &FetchOptions,
    owner_id: &str,
    feed_url: &str,
) -> Result<(FeedSource, UpsertOutcome), IngestError> {
    let url = validate_feed_url(feed_url, opts.allow_private_hosts)?;
    let result = ingest_url(db, client, opts, owner_id, url.as_str()).await;

    match &result {
        Ok((source, outcome)) => tracing::info!(
            owner = %owner_id,
            feed_id = source.id,
            feed = %source.feed_url,
            inserted = outcome.items_inserted,
            "Feed added"
        ),
        Err(e) => tracing::warn!(owner = %owner_id, feed = %url, error = %e, "Failed to add feed"),
    }
    result
}

/// Re-ingests a registered feed source.
///
/// On failure the error message is recorded as the source's `last_error`;
/// a success clears it as part of the upsert.
pub async fn refresh_feed(
    db: &Database,
    client: &reqwest::Client,
    opts: &FetchOptions,
    source: &FeedSource,
) -> Result<UpsertOutcome, IngestError> {
    let result = ingest_url(db, client, opts, &source.owner_id, &source.feed_url)
        .await
        .map(|(_, outcome)| outcome);

    if let Err(e) = &result {
        tracing::warn!(feed_id = source.id, feed = %source.feed_url, error = %e, "Feed refresh failed");
        if let Err(db_err) = db.set_feed_error(source.id, Some(&e.to_string())).await {
            tracing::warn!(feed_id = source.id, error = %db_err, "Failed to record feed error");
        }
    }
    result
}

/// Fetch → parse → upsert for one URL, without touching `last_error` on
/// failure. Shared by the single-feed paths and the batch orchestrator.
pub(crate) async fn ingest_url(
    db: &Database,
    client: &reqwest::Client,
    opts: &FetchOptions,
    owner_id: &str,
    feed_url: &str,
) -> Result<(FeedSource, UpsertOutcome), IngestError> {
    let fetched = fetch_feed(client, feed_url, opts).await?;
    let feed = parse_feed(&fetched.body)?;

    if feed.skipped > 0 {
        tracing::debug!(feed = %feed_url, skipped = feed.skipped, "Items without a URL skipped");
    }

    Ok(db.apply_parsed_feed(owner_id, feed_url, &feed).await?)
}
