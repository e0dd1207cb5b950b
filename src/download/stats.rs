//! Run-level outcome counters and the end-of-run summary.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use super::task::DownloadOutcome;

/// Counters for one dispatch, updated concurrently by workers.
#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    outputs: AtomicUsize,
    skipped_existing: AtomicUsize,
    skipped_no_data: AtomicUsize,
    retried: AtomicUsize,
    failed: AtomicUsize,
    not_reached: AtomicUsize,
}

impl DispatchStats {
    pub(crate) fn record(&self, outcome: &DownloadOutcome) {
        let counter = match outcome {
            DownloadOutcome::Success(_) => &self.outputs,
            DownloadOutcome::SkippedExisting(_) => &self.skipped_existing,
            DownloadOutcome::SkippedNoData(_) => &self.skipped_no_data,
            DownloadOutcome::Failed(_) => &self.failed,
            DownloadOutcome::NotReached(_) => &self.not_reached,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> RunSummary {
        RunSummary {
            outputs: self.outputs.load(Ordering::SeqCst),
            skipped_existing: self.skipped_existing.load(Ordering::SeqCst),
            skipped_no_data: self.skipped_no_data.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            not_reached: self.not_reached.load(Ordering::SeqCst),
        }
    }
}

/// Outcome counts for one or more download cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files written.
    pub outputs: usize,
    /// Targets that already existed.
    pub skipped_existing: usize,
    /// Resources answered with the no-data placeholder.
    pub skipped_no_data: usize,
    /// Calls queued for the sequential retry pass.
    pub retried: usize,
    /// Resources that failed the retry pass too.
    pub failed: usize,
    /// Resources never attempted because of cancellation.
    pub not_reached: usize,
}

impl RunSummary {
    /// Each task counted once by its final outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outputs + self.skipped_existing + self.skipped_no_data + self.failed + self.not_reached
    }

    /// Adds another summary's counts to this one.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.outputs += other.outputs;
        self.skipped_existing += other.skipped_existing;
        self.skipped_no_data += other.skipped_no_data;
        self.retried += other.retried;
        self.failed += other.failed;
        self.not_reached += other.not_reached;
    }

    /// Emits the summary as structured log lines.
    pub fn log(&self) {
        info!(
            outputs = self.outputs,
            skipped_existing = self.skipped_existing,
            skipped_no_data = self.skipped_no_data,
            retried = self.retried,
            failed = self.failed,
            not_reached = self.not_reached,
            total = self.total(),
            "download summary"
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "  outputs            {:>6}", self.outputs)?;
        writeln!(f, "  skipped (exists)   {:>6}", self.skipped_existing)?;
        writeln!(f, "  skipped (no data)  {:>6}", self.skipped_no_data)?;
        writeln!(f, "  retried            {:>6}", self.retried)?;
        writeln!(f, "  failed             {:>6}", self.failed)?;
        writeln!(f, "  not reached        {:>6}", self.not_reached)?;
        write!(f, "  total              {:>6}", self.total())
    }
}
