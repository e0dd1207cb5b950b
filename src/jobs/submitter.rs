//! Concurrent job submission with durable markers.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiClient, ApiError, JobHandle, Request};
use crate::marker::MarkerStore;
use crate::retry::RetryPolicy;

/// Upper bound on concurrent submissions.
pub const MAX_SUBMIT_JOBS: usize = 8;

/// Submits requests and records each accepted job in the marker store.
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    api: ApiClient,
    markers: MarkerStore,
    retry: RetryPolicy,
}

impl JobSubmitter {
    /// Creates a submitter.
    #[must_use]
    pub fn new(api: ApiClient, markers: MarkerStore, retry: RetryPolicy) -> Self {
        Self {
            api,
            markers,
            retry,
        }
    }

    /// Submits one request and writes its marker before returning the handle.
    ///
    /// Transport failures are retried per the submission policy. Marker
    /// failures are returned as is.
    ///
    /// # Errors
    ///
    /// Returns the last [`ApiError`] once retries are exhausted, the first
    /// fatal one, or [`ApiError::Marker`] if the marker cannot be written.
    #[instrument(skip(self), fields(uri = %request))]
    pub async fn submit(&self, request: &Request) -> Result<JobHandle, ApiError> {
        let handle = self
            .retry
            .run("submit", || self.api.submit(request))
            .await?;
        self.markers.put(&handle, request)?;
        info!(handle = %handle, "job submitted");
        Ok(handle)
    }

    /// Submits every unique request with up to `n_jobs` in flight.
    ///
    /// Duplicates are dropped keeping first occurrences. Handles are returned
    /// in the order of the de-duplicated input. The first failure (in input
    /// order) aborts outstanding submissions and is returned unchanged;
    /// markers already written stay on disk for recovery.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the first failed submission.
    #[instrument(skip(self, requests), fields(requests = requests.len()))]
    pub async fn submit_all(
        &self,
        requests: &[Request],
        n_jobs: usize,
    ) -> Result<Vec<JobHandle>, ApiError> {
        let unique = dedup_requests(requests);
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let n_jobs = effective_jobs(n_jobs, unique.len());
        if unique.len() < requests.len() {
            debug!(
                dropped = requests.len() - unique.len(),
                "dropped duplicate requests"
            );
        }
        info!(count = unique.len(), n_jobs, "submitting jobs");

        let semaphore = Arc::new(Semaphore::new(n_jobs));
        let mut tasks = Vec::with_capacity(unique.len());

        for request in unique {
            let semaphore = Arc::clone(&semaphore);
            let submitter = self.clone();
            let uri = request.uri().to_string();
            let task = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Err(ApiError::interrupted(request.uri()));
                };
                submitter.submit(&request).await
            });
            tasks.push((uri, task));
        }

        let mut handles = Vec::with_capacity(tasks.len());
        let mut pending = tasks.into_iter();
        while let Some((uri, task)) = pending.next() {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_panic() => {
                    std::panic::resume_unwind(join_error.into_panic())
                }
                Err(_) => Err(ApiError::interrupted(&uri)),
            };
            match outcome {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    warn!(uri = %uri, error = %error, "submission failed, aborting batch");
                    for (_, rest) in pending {
                        rest.abort();
                    }
                    return Err(error);
                }
            }
        }

        Ok(handles)
    }
}

/// Removes duplicate requests, keeping the first occurrence of each.
#[must_use]
pub fn dedup_requests(requests: &[Request]) -> Vec<Request> {
    let mut seen = HashSet::with_capacity(requests.len());
    requests
        .iter()
        .filter(|request| seen.insert(request.uri()))
        .cloned()
        .collect()
}

/// Clamps `n_jobs` to `[1, min(MAX_SUBMIT_JOBS, len)]`.
#[must_use]
pub fn effective_jobs(n_jobs: usize, len: usize) -> usize {
    let upper = len.min(MAX_SUBMIT_JOBS).max(1);
    n_jobs.clamp(1, upper)
}
