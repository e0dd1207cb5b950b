//! Parallel download of job resources.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large rasters)
//! - Filename from Content-Disposition, falling back to the URI
//! - Idempotent re-runs: existing targets are skipped without a request
//! - No-data placeholder detection
//! - One sequential retry pass for non-200 responses

mod dispatcher;
mod error;
mod fetch;
mod filename;
mod stats;
mod task;

pub use dispatcher::{DispatchReport, DownloadDispatcher, MAX_CONCURRENCY};
pub use error::DispatchError;
pub use stats::RunSummary;
pub use task::{DownloadOutcome, DownloadTask, NO_DATA_SENTINEL};
