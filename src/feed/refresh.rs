use futures::stream::{self, StreamExt};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tokio::sync::mpsc;

use super::fetcher::FetchOptions;
use super::ingest::{ingest_url, IngestError};
use crate::storage::{Database, DatabaseError, UpsertOutcome};

/// Progress notifications emitted by [`refresh_all`].
///
/// `index` is the feed's position in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    Started { total: usize },
    FeedStarted { index: usize, feed_id: i64 },
    FeedFinished { index: usize, feed_id: i64, succeeded: bool },
    Completed { succeeded: usize, failed: usize },
}

/// Outcome of refreshing one feed within a batch.
#[derive(Debug)]
pub struct FeedRefreshResult {
    pub feed_id: i64,
    pub feed_url: String,
    pub result: Result<UpsertOutcome, IngestError>,
}

impl FeedRefreshResult {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl Serialize for FeedRefreshResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FeedRefreshResult", 4)?;
        state.serialize_field("feed_id", &self.feed_id)?;
        state.serialize_field("feed_url", &self.feed_url)?;
        match &self.result {
            Ok(outcome) => {
                state.serialize_field("outcome", &Some(outcome))?;
                state.serialize_field("error", &None::<String>)?;
            }
            Err(e) => {
                state.serialize_field("outcome", &None::<UpsertOutcome>)?;
                state.serialize_field("error", &Some(e.to_string()))?;
            }
        }
        state.end()
    }
}

/// Aggregate result of a batch refresh; `results` follows registration order.
#[derive(Debug, Default, serde::Serialize)]
pub struct RefreshReport {
    pub results: Vec<FeedRefreshResult>,
    pub success_count: usize,
    pub total_items_fetched: usize,
    pub total_items_inserted: usize,
}

impl RefreshReport {
    fn from_results(results: Vec<FeedRefreshResult>) -> Self {
        let mut report = RefreshReport::default();
        for outcome in results.iter().filter_map(|r| r.result.as_ref().ok()) {
            report.success_count += 1;
            report.total_items_fetched += outcome.items_fetched;
            report.total_items_inserted += outcome.items_inserted;
        }
        report.results = results;
        report
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count
    }
}

/// Refreshes every feed source of an owner, isolating per-feed failures.
///
/// Each feed goes through fetch, parse and upsert independently; an error
/// is captured in that feed's [`FeedRefreshResult`] and never aborts the
/// batch. With `opts.concurrency` at 1 feeds run strictly one after another;
/// higher values run a bounded pipeline that still reports results in
/// registration order.
///
/// After the batch, every feed's `last_error` is written in one statement
/// (cleared for successes).
///
/// # Errors
///
/// Only failing to list the owner's feeds is an error; nothing has been
/// fetched at that point.
pub async fn refresh_all(
    db: &Database,
    client: &reqwest::Client,
    opts: &FetchOptions,
    owner_id: &str,
    progress: Option<mpsc::Sender<RefreshEvent>>,
) -> Result<RefreshReport, DatabaseError> {
    let sources = db.get_feed_sources_for_owner(owner_id).await?;
    let total = sources.len();
    emit(&progress, RefreshEvent::Started { total }).await;

    if sources.is_empty() {
        emit(&progress, RefreshEvent::Completed { succeeded: 0, failed: 0 }).await;
        return Ok(RefreshReport::default());
    }

    let results: Vec<FeedRefreshResult> = stream::iter(sources.into_iter().enumerate())
        .map(|(index, source)| {
            let progress = progress.clone();
            async move {
                emit(&progress, RefreshEvent::FeedStarted { index, feed_id: source.id }).await;

                let result = ingest_url(db, client, opts, &source.owner_id, &source.feed_url)
                    .await
                    .map(|(_, outcome)| outcome);

                match &result {
                    Ok(outcome) => tracing::debug!(
                        feed_id = source.id,
                        feed = %source.feed_url,
                        fetched = outcome.items_fetched,
                        inserted = outcome.items_inserted,
                        "Feed refreshed"
                    ),
                    Err(e) => tracing::warn!(
                        feed_id = source.id,
                        feed = %source.feed_url,
                        error = %e,
                        "Feed refresh failed"
                    ),
                }

                emit(
                    &progress,
                    RefreshEvent::FeedFinished {
                        index,
                        feed_id: source.id,
                        succeeded: result.is_ok(),
                    },
                )
                .await;

                FeedRefreshResult {
                    feed_id: source.id,
                    feed_url: source.feed_url,
                    result,
                }
            }
        })
        .buffered(opts.concurrency.max(1))
        .collect()
        .await;

    // Batch update all feed error statuses in a single statement
    let updates: Vec<(i64, Option<String>)> = results
        .iter()
        .map(|r| (r.feed_id, r.result.as_ref().err().map(ToString::to_string)))
        .collect();
    if let Err(e) = db.batch_set_feed_errors(&updates).await {
        tracing::warn!(error = %e, "Failed to batch update feed error statuses");
    }

    let report = RefreshReport::from_results(results);
    tracing::info!(
        owner = %owner_id,
        feeds = total,
        succeeded = report.success_count,
        failed = report.failure_count(),
        inserted = report.total_items_inserted,
        "Refresh complete"
    );
    emit(
        &progress,
        RefreshEvent::Completed {
            succeeded: report.success_count,
            failed: report.failure_count(),
        },
    )
    .await;

    Ok(report)
}

async fn emit(progress: &Option<mpsc::Sender<RefreshEvent>>, event: RefreshEvent) {
    if let Some(tx) = progress {
        if let Err(e) = tx.send(event).await {
            tracing::debug!(error = %e, "Progress channel send failed (receiver dropped)");
        }
    }
}
