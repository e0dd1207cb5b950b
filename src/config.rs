//! Tunables for the job lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use crate::marker::DEFAULT_MARKER_EXT;
use crate::retry::RetryPolicy;

/// Fixed interval between status polls while waiting for a job (5 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for the submitter, poller and dispatcher.
///
/// Defaults mirror the backend's expected client behaviour: 3 submission
/// attempts, 7 status attempts, a 5s poll interval and no overall wait limit.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Retry policy for job submission.
    pub submit_retry: RetryPolicy,
    /// Retry policy for a single status poll.
    pub status_retry: RetryPolicy,
    /// Sleep between polls while waiting for completion.
    pub poll_interval: Duration,
    /// Optional overall limit on waiting for one job.
    pub max_wait: Option<Duration>,
    /// Directory holding marker files and audit logs.
    pub marker_dir: PathBuf,
    /// Marker file extension.
    pub marker_ext: String,
    /// Directory downloaded resources are written to.
    pub output_dir: PathBuf,
    /// Re-download files that already exist.
    pub overwrite: bool,
    /// Draw the poll progress bar on stderr.
    pub show_progress: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            submit_retry: RetryPolicy::submission(),
            status_retry: RetryPolicy::status_poll(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            marker_dir: PathBuf::from("."),
            marker_ext: DEFAULT_MARKER_EXT.to_string(),
            output_dir: PathBuf::from("."),
            overwrite: false,
            show_progress: true,
        }
    }
}

impl ClientConfig {
    /// Sets the marker directory.
    #[must_use]
    pub fn with_marker_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.marker_dir = dir.into();
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the overall wait limit per job.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Enables or disables overwriting existing files.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Enables or disables the progress bar.
    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Replaces both retry schedules with `base`/`max` delays and no jitter.
    ///
    /// Attempt ceilings and classifiers are kept.
    #[must_use]
    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.submit_retry = self.submit_retry.with_delays(base, max).without_jitter();
        self.status_retry = self.status_retry.with_delays(base, max).without_jitter();
        self
    }
}
