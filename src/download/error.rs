//! Fatal dispatcher errors.

use thiserror::Error;

use crate::api::ApiError;

/// Errors that abort a download cycle.
///
/// Per-file HTTP failures are not errors; they end up as
/// [`DownloadOutcome::Failed`](super::DownloadOutcome::Failed).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Transport, file system or marker failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A download worker panicked.
    #[error("download worker panicked: {0}")]
    WorkerPanicked(String),
}
