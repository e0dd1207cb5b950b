//! Download tasks and their per-file outcomes.

use std::path::{Path, PathBuf};

use super::filename::filename_from_uri;

/// Filename the backend uses for its "no data" placeholder image.
pub const NO_DATA_SENTINEL: &str = "transparent.png";

/// A resource URI to fetch and the file it is expected to land in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadTask {
    uri: String,
    target: PathBuf,
}

impl DownloadTask {
    /// Creates a task, deriving the target path from the URI.
    pub fn new(uri: impl Into<String>, output_dir: &Path) -> Self {
        let uri = uri.into();
        let target = output_dir.join(filename_from_uri(&uri));
        Self { uri, target }
    }

    /// Resource URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Expected target path.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }
}

/// Final outcome of one download task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// File written to the given path.
    Success(PathBuf),
    /// Target already existed; no request was made.
    SkippedExisting(PathBuf),
    /// Backend answered with the no-data placeholder.
    SkippedNoData(String),
    /// Non-200 status on both the first attempt and the retry pass.
    Failed(String),
    /// Cancelled before the task started.
    NotReached(String),
}

impl DownloadOutcome {
    /// True when the resource needs no further attempts.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            Self::Success(_) | Self::SkippedExisting(_) | Self::SkippedNoData(_)
        )
    }
}
