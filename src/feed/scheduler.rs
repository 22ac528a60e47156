use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::feed::source::FeedSource;
use crate::types::RawEntry;

/// Lower and upper bound on concurrently running fetches.
pub const MIN_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 12;

/// Terminal state of one source in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Success,
    Failed,
    Skipped,
}

/// A per-source failure, kept for the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source_name: String,
    pub source_url: String,
    pub message: String,
}

impl Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.source_name, self.source_url, self.message)
    }
}

/// Everything a batch produced.
///
/// `success`, `failed` and `skipped` partition the input source URLs.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Entries of successful sources, in source order.
    pub entries: Vec<RawEntry>,
    pub success: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub skipped: BTreeSet<String>,
    pub errors: Vec<SourceError>,
}

impl BatchOutcome {
    pub fn status_of(&self, url: &str) -> Option<SourceStatus> {
        if self.success.contains(url) {
            Some(SourceStatus::Success)
        } else if self.failed.contains(url) {
            Some(SourceStatus::Failed)
        } else if self.skipped.contains(url) {
            Some(SourceStatus::Skipped)
        } else {
            None
        }
    }

    /// Error message recorded for a failed source.
    pub fn error_for(&self, url: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.source_url == url)
            .map(|e| e.message.as_str())
    }
}

/// Worker ceiling for a batch of `sources` sources.
pub fn worker_count(sources: usize) -> usize {
    sources.clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Runs `fetch` for every source under one wall-clock `budget`.
///
/// Each source runs in its own tokio task; a semaphore bounds how many are
/// active at once (see [`worker_count`]). The controller waits for the next
/// completion only until the deadline. When the budget runs out, every source
/// whose completion has not been observed is marked skipped and its task is
/// detached rather than aborted; whatever it returns later is discarded.
///
/// Failures and panics inside a task are recorded per source and never abort
/// the batch.
pub async fn run_batch<F, Fut, E>(sources: &[FeedSource], budget: Duration, fetch: F) -> BatchOutcome
where
    F: Fn(FeedSource) -> Fut,
    Fut: Future<Output = Result<Vec<RawEntry>, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut outcome = BatchOutcome::default();
    if sources.is_empty() {
        return outcome;
    }

    let started = Instant::now();
    let deadline = started + budget;
    let semaphore = Arc::new(Semaphore::new(worker_count(sources.len())));

    let mut pending: FuturesUnordered<_> = sources
        .iter()
        .enumerate()
        .map(|(idx, source)| {
            let work = fetch(source.clone());
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                work.await
            });
            async move { (idx, handle.await) }
        })
        .collect();

    let mut finished: BTreeMap<usize, Vec<RawEntry>> = BTreeMap::new();

    loop {
        let next = match tokio::time::timeout_at(deadline, pending.next()).await {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    budget_secs = budget.as_secs_f64(),
                    outstanding = pending.len(),
                    "Time budget exhausted, skipping unfinished sources"
                );
                break;
            }
        };

        let (idx, joined) = next;
        let source = &sources[idx];
        if Instant::now() > deadline {
            tracing::debug!(source = %source.url, "Completion observed after deadline, skipping");
            continue;
        }

        match joined {
            Ok(Ok(entries)) => {
                tracing::debug!(source = %source.url, count = entries.len(), "Source fetched");
                outcome.success.insert(source.url.clone());
                finished.insert(idx, entries);
            }
            Ok(Err(e)) => {
                tracing::warn!(source = %source.url, error = %e, "Source failed");
                record_failure(&mut outcome, source, e.to_string());
            }
            Err(join_err) => {
                tracing::warn!(source = %source.url, error = %join_err, "Fetch task panicked");
                record_failure(&mut outcome, source, format!("task failed: {join_err}"));
            }
        }
    }
    // Dropping the join handles detaches any task still running.
    drop(pending);

    for source in sources {
        if !outcome.success.contains(&source.url) && !outcome.failed.contains(&source.url) {
            outcome.skipped.insert(source.url.clone());
        }
    }
    outcome.entries = finished.into_values().flatten().collect();

    tracing::info!(
        success = outcome.success.len(),
        failed = outcome.failed.len(),
        skipped = outcome.skipped.len(),
        entries = outcome.entries.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fetch batch finished"
    );
    outcome
}

fn record_failure(outcome: &mut BatchOutcome, source: &FeedSource, message: String) {
    outcome.failed.insert(source.url.clone());
    outcome.errors.push(SourceError {
        source_name: source.name.clone(),
        source_url: source.url.clone(),
        message,
    });
}
