//! Concurrent download dispatch with a single sequential retry pass.
//!
//! The dispatcher fetches a batch of [`DownloadTask`]s with a semaphore-bounded
//! set of Tokio tasks. Each task ends in one of:
//!
//! - **Success**: streamed to disk
//! - **SkippedExisting**: target already present, no request issued
//! - **SkippedNoData**: backend served the `transparent.png` placeholder
//! - **retry queue**: any non-200 status
//!
//! After every worker has joined, queued tasks are fetched once more, one at a
//! time. Tasks still failing become **Failed**. Transport and file system
//! errors are fatal for the whole dispatch and are returned after the join.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use vds_client::{ApiClient, DownloadDispatcher, DownloadTask, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let api = ApiClient::new(Session::builder().build()?);
//! let dispatcher = DownloadDispatcher::new(api);
//! let tasks = vec![DownloadTask::new(
//!     "https://maps.vandersat.com/api/v2/api-requests/abc/files/SM.tif/download",
//!     Path::new("./out"),
//! )];
//! let report = dispatcher.dispatch(tasks, 4).await?;
//! println!("{}", report.summary);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::DispatchError;
use super::fetch::{FetchResult, fetch};
use super::stats::{DispatchStats, RunSummary};
use super::task::{DownloadOutcome, DownloadTask};
use crate::api::{ApiClient, ApiError};

/// Upper bound on simultaneous downloads; larger requests are clamped.
pub const MAX_CONCURRENCY: usize = 64;

/// Result of one dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Final outcome per task, in completion order.
    pub outcomes: Vec<(DownloadTask, DownloadOutcome)>,
    /// Counts for this dispatch.
    pub summary: RunSummary,
}

/// Dispatches download tasks across a bounded worker pool.
#[derive(Debug, Clone)]
pub struct DownloadDispatcher {
    api: ApiClient,
    overwrite: bool,
    cancel: CancellationToken,
}

impl DownloadDispatcher {
    /// Creates a dispatcher that skips existing files.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            overwrite: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Re-downloads targets that already exist.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Tasks not yet started when `cancel` fires are reported as not reached.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetches `tasks` with up to `n_proc` in flight.
    ///
    /// Duplicate URIs are fetched once. `n_proc` is clamped to
    /// `1..=MAX_CONCURRENCY` and then reduced to the task count.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Api`] on a transport or file system error
    /// - [`DispatchError::WorkerPanicked`] if a worker panicked
    ///
    /// Non-200 responses never produce an error.
    #[instrument(skip(self, tasks), fields(tasks = tasks.len()))]
    pub async fn dispatch(
        &self,
        tasks: Vec<DownloadTask>,
        n_proc: usize,
    ) -> Result<DispatchReport, DispatchError> {
        let tasks = dedup_tasks(tasks);
        if tasks.is_empty() {
            debug!("nothing to download");
            return Ok(DispatchReport::default());
        }

        let workers = effective_workers(n_proc, tasks.len());
        info!(tasks = tasks.len(), workers, "starting downloads");

        let stats = Arc::new(DispatchStats::default());
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let semaphore = Arc::clone(&semaphore);
            let stats = Arc::clone(&stats);
            let api = self.api.clone();
            let cancel = self.cancel.clone();
            let overwrite = self.overwrite;

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    let outcome = DownloadOutcome::NotReached(task.uri().to_string());
                    stats.record(&outcome);
                    return (task, Ok(FetchResult::Done(outcome)));
                };

                if cancel.is_cancelled() {
                    let outcome = DownloadOutcome::NotReached(task.uri().to_string());
                    stats.record(&outcome);
                    return (task, Ok(FetchResult::Done(outcome)));
                }

                let result = fetch(&api, &task, overwrite).await;
                match &result {
                    Ok(FetchResult::Done(outcome)) => stats.record(outcome),
                    Ok(FetchResult::Retry { .. }) => stats.increment_retried(),
                    Err(_) => {}
                }
                (task, result)
            }));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut retry_queue = Vec::new();
        let mut fatal: Option<DispatchError> = None;

        for handle in handles {
            match handle.await {
                Ok((task, Ok(FetchResult::Done(outcome)))) => {
                    debug!(uri = task.uri(), outcome = ?outcome, "task finished");
                    outcomes.push((task, outcome));
                }
                Ok((task, Ok(FetchResult::Retry { status }))) => {
                    warn!(uri = task.uri(), status, "download failed, queued for retry");
                    retry_queue.push(task);
                }
                Ok((task, Err(error))) => {
                    warn!(uri = task.uri(), error = %error, "download aborted");
                    fatal.get_or_insert(DispatchError::Api(error));
                }
                Err(join_error) => {
                    warn!(error = %join_error, "download task panicked");
                    fatal.get_or_insert(DispatchError::WorkerPanicked(join_error.to_string()));
                }
            }
        }

        if let Some(error) = fatal {
            return Err(error);
        }

        if !retry_queue.is_empty() {
            info!(count = retry_queue.len(), "retrying failed downloads");
        }
        for task in retry_queue {
            let outcome = self.retry_once(&task).await?;
            stats.record(&outcome);
            outcomes.push((task, outcome));
        }

        let summary = stats.snapshot();
        info!(
            outputs = summary.outputs,
            skipped_existing = summary.skipped_existing,
            skipped_no_data = summary.skipped_no_data,
            retried = summary.retried,
            failed = summary.failed,
            not_reached = summary.not_reached,
            "downloads complete"
        );

        Ok(DispatchReport { outcomes, summary })
    }

    async fn retry_once(&self, task: &DownloadTask) -> Result<DownloadOutcome, ApiError> {
        if self.cancel.is_cancelled() {
            return Ok(DownloadOutcome::NotReached(task.uri().to_string()));
        }
        match fetch(&self.api, task, self.overwrite).await? {
            FetchResult::Done(outcome) => Ok(outcome),
            FetchResult::Retry { status } => {
                warn!(uri = task.uri(), status, "download failed permanently");
                Ok(DownloadOutcome::Failed(task.uri().to_string()))
            }
        }
    }
}

/// Clamps a requested concurrency to `1..=MAX_CONCURRENCY`, then to the task count.
fn effective_workers(n_proc: usize, task_count: usize) -> usize {
    let clamped = n_proc.clamp(1, MAX_CONCURRENCY);
    if clamped != n_proc {
        debug!(requested = n_proc, used = clamped, "concurrency clamped");
    }
    clamped.min(task_count)
}

/// Drops tasks with a URI already seen, keeping first occurrences.
fn dedup_tasks(tasks: Vec<DownloadTask>) -> Vec<DownloadTask> {
    let mut seen = HashSet::with_capacity(tasks.len());
    tasks
        .into_iter()
        .filter(|task| seen.insert(task.uri().to_string()))
        .collect()
}
