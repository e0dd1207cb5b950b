//! Single-resource fetch: skip checks, sentinel detection and streaming to disk.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::CONTENT_DISPOSITION;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::filename::{parse_content_disposition, sanitize_filename};
use super::task::{DownloadOutcome, DownloadTask, NO_DATA_SENTINEL};
use crate::api::{ApiClient, ApiError};

/// Result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchResult {
    /// Task reached a final outcome.
    Done(DownloadOutcome),
    /// Backend answered with a non-200 status.
    Retry {
        /// The status received.
        status: u16,
    },
}

/// Fetches one task.
///
/// Existing targets are skipped without a request unless `overwrite` is set.
///
/// # Errors
///
/// Transport and file system errors are returned as [`ApiError`]; a partial
/// file is removed before returning.
pub(crate) async fn fetch(
    api: &ApiClient,
    task: &DownloadTask,
    overwrite: bool,
) -> Result<FetchResult, ApiError> {
    if !overwrite && tokio::fs::try_exists(task.target()).await.unwrap_or(false) {
        debug!(path = %task.target().display(), "target exists, skipping");
        return Ok(FetchResult::Done(DownloadOutcome::SkippedExisting(
            task.target().to_path_buf(),
        )));
    }

    let response = api.get_stream(task.uri()).await?;
    if response.status() != StatusCode::OK {
        let status = response.status().as_u16();
        debug!(uri = task.uri(), status, "non-200 response");
        return Ok(FetchResult::Retry { status });
    }

    let served_name = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_disposition);

    if served_name.as_deref() == Some(NO_DATA_SENTINEL) {
        debug!(uri = task.uri(), "no data for resource");
        return Ok(FetchResult::Done(DownloadOutcome::SkippedNoData(
            task.uri().to_string(),
        )));
    }

    let path = write_path(task, served_name.as_deref());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::io(parent, e))?;
    }

    if let Err(error) = stream_to_file(response, task.uri(), &path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %cleanup, "failed to remove partial file");
        }
        return Err(error);
    }

    Ok(FetchResult::Done(DownloadOutcome::Success(path)))
}

fn write_path(task: &DownloadTask, served_name: Option<&str>) -> PathBuf {
    match (served_name, task.target().parent()) {
        (Some(name), Some(dir)) if !name.trim().is_empty() => dir.join(sanitize_filename(name)),
        _ => task.target().to_path_buf(),
    }
}

/// Streams the response body to `path`, returning bytes written.
async fn stream_to_file(
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<u64, ApiError> {
    let file = File::create(path).await.map_err(|e| ApiError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| ApiError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ApiError::io(path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| ApiError::io(path, e))?;

    debug!(path = %path.display(), bytes = bytes_written, "file written");
    Ok(bytes_written)
}
