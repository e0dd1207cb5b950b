//! Status polling until a job's resources are ready.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::api::{ApiClient, ApiError, JobHandle, JobStatus};
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::retry::RetryPolicy;

/// Width of the progress bar in characters.
const PROGRESS_BAR_WIDTH: usize = 25;

/// Polls job status with per-call retries and an optional overall limit.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    api: ApiClient,
    retry: RetryPolicy,
    interval: Duration,
    max_wait: Option<Duration>,
    show_progress: bool,
    cancel: CancellationToken,
}

impl StatusPoller {
    /// Creates a poller with the 5s interval, no wait limit and progress shown.
    #[must_use]
    pub fn new(api: ApiClient, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            show_progress: true,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the sleep between polls.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets an overall wait limit; `None` waits indefinitely.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Shows or hides the progress bar.
    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Uses `cancel` to stop waiting.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Polls `handle` once, or until complete when `wait_for_complete` is set.
    ///
    /// A job is complete at 100%, reported ready, with resources attached.
    ///
    /// # Errors
    ///
    /// - the last [`ApiError`] of a poll whose retries are exhausted, or the
    ///   first fatal one
    /// - [`ApiError::Interrupted`] when the cancellation token fires
    /// - [`ApiError::PollTimeout`] when the overall wait limit is reached
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn poll(
        &self,
        handle: &JobHandle,
        wait_for_complete: bool,
    ) -> Result<JobStatus, ApiError> {
        if !wait_for_complete {
            return self.poll_once(handle).await;
        }

        let started = Instant::now();
        let bar = self.progress_bar(handle);

        let result = loop {
            let status = match self.poll_once(handle).await {
                Ok(status) => status,
                Err(error) => break Err(error),
            };
            bar.set_position(u64::from(status.percentage));
            debug!(percentage = status.percentage, readiness = ?status.readiness, "polled");

            if status.is_complete() {
                break Ok(status);
            }

            if let Some(limit) = self.max_wait {
                let waited = started.elapsed();
                if waited >= limit {
                    break Err(ApiError::PollTimeout {
                        handle: handle.to_string(),
                        waited,
                    });
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    break Err(ApiError::interrupted(self.api.status_uri(handle)));
                }
                () = tokio::time::sleep(self.interval) => {}
            }
        };

        match &result {
            Ok(status) => {
                bar.finish_and_clear();
                info!(
                    resources = status.resources.as_ref().map_or(0, Vec::len),
                    "job ready"
                );
            }
            Err(_) => bar.abandon(),
        }
        result
    }

    async fn poll_once(&self, handle: &JobHandle) -> Result<JobStatus, ApiError> {
        let uri = self.api.status_uri(handle);
        let uri = uri.as_str();
        self.retry
            .run_until_cancelled(uri, &self.cancel, move || async move {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(ApiError::interrupted(uri)),
                    result = self.api.status(handle) => result,
                }
            })
            .await
    }

    fn progress_bar(&self, handle: &JobHandle) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(100);
        let template = format!("{{prefix}} [{{bar:{PROGRESS_BAR_WIDTH}}}] {{pos:>3}}%");
        bar.set_style(
            ProgressStyle::with_template(&template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_prefix(handle.to_string());
        bar
    }
}
