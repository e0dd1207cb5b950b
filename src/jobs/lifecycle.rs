//! Orchestration of submit → poll → download → marker cleanup.
//!
//! [`LifecycleCoordinator`] owns the in-memory list of pending job handles and
//! is the only component that deletes markers. On construction it folds every
//! marker already on disk into the pending list, so a restarted process picks
//! up jobs a previous run left unfinished.
//!
//! A job whose status cannot be read does not block the others: it is reported
//! unresolved and keeps its marker until it succeeds or is [abandoned].
//!
//! [abandoned]: LifecycleCoordinator::abandon

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::poller::StatusPoller;
use super::submitter::JobSubmitter;
use crate::api::{ApiClient, ApiError, JobHandle, Request};
use crate::config::ClientConfig;
use crate::download::{DispatchError, DownloadDispatcher, DownloadTask, RunSummary};
use crate::marker::{MarkerError, MarkerStore};
use crate::session::Session;

/// Result of one download cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Counts for this cycle.
    pub summary: RunSummary,
    /// Handles whose resources were all resolved; their markers are gone.
    pub resolved: Vec<JobHandle>,
    /// Handles that keep their marker for a later run, including those whose
    /// status check failed.
    pub unresolved: Vec<JobHandle>,
    /// Audit log written for this cycle, if any handle was resolved.
    pub audit_log: Option<PathBuf>,
}

/// Drives jobs from submission to cleaned-up markers.
#[derive(Debug)]
pub struct LifecycleCoordinator {
    api: ApiClient,
    markers: MarkerStore,
    submitter: JobSubmitter,
    poller: StatusPoller,
    dispatcher: DownloadDispatcher,
    output_dir: PathBuf,
    pending: Vec<JobHandle>,
    queued: BTreeMap<String, Vec<JobHandle>>,
    polled: BTreeSet<JobHandle>,
    failed: BTreeSet<JobHandle>,
    summary: RunSummary,
}

impl LifecycleCoordinator {
    /// Creates a coordinator and recovers markers left on disk.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError`] if the marker directory cannot be scanned.
    pub fn new(
        session: Session,
        config: &ClientConfig,
        cancel: CancellationToken,
    ) -> Result<Self, MarkerError> {
        let api = ApiClient::new(session);
        let markers = MarkerStore::with_extension(&config.marker_dir, config.marker_ext.clone());
        let submitter = JobSubmitter::new(api.clone(), markers.clone(), config.submit_retry.clone());
        let poller = StatusPoller::new(api.clone(), config.status_retry.clone())
            .with_interval(config.poll_interval)
            .with_max_wait(config.max_wait)
            .with_progress(config.show_progress)
            .with_cancellation(cancel.clone());
        let dispatcher = DownloadDispatcher::new(api.clone())
            .with_overwrite(config.overwrite)
            .with_cancellation(cancel);

        let mut coordinator = Self {
            api,
            markers,
            submitter,
            poller,
            dispatcher,
            output_dir: config.output_dir.clone(),
            pending: Vec::new(),
            queued: BTreeMap::new(),
            polled: BTreeSet::new(),
            failed: BTreeSet::new(),
            summary: RunSummary::default(),
        };
        coordinator.recover()?;
        Ok(coordinator)
    }

    /// Folds markers on disk into the pending list, returning how many were new.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError`] if the marker directory cannot be scanned.
    pub fn recover(&mut self) -> Result<usize, MarkerError> {
        let found = self.markers.scan()?;
        let added = self.track(found);
        if added > 0 {
            info!(count = added, dir = %self.markers.dir().display(), "recovered unfinished jobs");
        }
        Ok(added)
    }

    /// Handles submitted or recovered but not yet fully downloaded.
    #[must_use]
    pub fn pending(&self) -> &[JobHandle] {
        &self.pending
    }

    /// Number of resource URIs waiting for the next download cycle.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Counts accumulated over every cycle so far.
    #[must_use]
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Marker store backing this coordinator.
    #[must_use]
    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// Submits `requests` and adds the new handles to the pending list.
    ///
    /// # Errors
    ///
    /// Returns the first submission error; see [`JobSubmitter::submit_all`].
    pub async fn submit(
        &mut self,
        requests: &[Request],
        n_jobs: usize,
    ) -> Result<Vec<JobHandle>, ApiError> {
        let handles = self.submitter.submit_all(requests, n_jobs).await?;
        self.track(handles.iter().cloned());
        Ok(handles)
    }

    /// Polls each pending handle and queues its resources for download.
    ///
    /// With `wait_for_complete` unset, handles not yet complete are left
    /// pending for a later call. A handle whose poll fails (retries exhausted,
    /// fatal payload, wait limit) is logged and set aside as unresolved for
    /// this cycle; polling moves on to the next one. Returns the number of
    /// queued URIs.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Interrupted`] when cancelled, or [`ApiError::Marker`]
    /// if the marker directory cannot be scanned. Handles queued before an
    /// interrupt stay queued.
    #[instrument(skip(self), fields(pending = self.pending.len()))]
    pub async fn queue_pending(&mut self, wait_for_complete: bool) -> Result<usize, ApiError> {
        self.recover()?;

        let to_poll: Vec<JobHandle> = self
            .pending
            .iter()
            .filter(|handle| !self.polled.contains(*handle))
            .cloned()
            .collect();

        for handle in to_poll {
            let status = match self.poller.poll(&handle, wait_for_complete).await {
                Ok(status) => status,
                Err(error @ ApiError::Interrupted { .. }) => return Err(error),
                Err(error) => {
                    warn!(
                        handle = %handle,
                        error = %error,
                        "status check failed, job keeps its marker"
                    );
                    self.failed.insert(handle);
                    continue;
                }
            };
            self.failed.remove(&handle);
            if !status.is_complete() {
                debug!(handle = %handle, percentage = status.percentage, "job not ready yet");
                continue;
            }

            let resources = status.resources.unwrap_or_default();
            debug!(handle = %handle, resources = resources.len(), "queueing resources");
            for location in &resources {
                let uri = self.api.resource_uri(location);
                let owners = self.queued.entry(uri).or_default();
                if !owners.contains(&handle) {
                    owners.push(handle.clone());
                }
            }
            self.polled.insert(handle);
        }

        Ok(self.queued.len())
    }

    /// Downloads every queued resource and reconciles markers.
    ///
    /// Handles whose resources all ended as success or skip lose their marker
    /// and are listed in the cycle's audit log. The rest stay pending.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] on a fatal dispatch error or a marker failure.
    /// Markers are left untouched when the dispatch itself fails.
    #[instrument(skip(self), fields(queued = self.queued.len()))]
    pub async fn download(&mut self, n_proc: usize) -> Result<CycleReport, DispatchError> {
        let tasks: Vec<DownloadTask> = self
            .queued
            .keys()
            .map(|uri| DownloadTask::new(uri.clone(), &self.output_dir))
            .collect();

        let report = self.dispatcher.dispatch(tasks, n_proc).await?;

        let resolved_uris: HashMap<&str, bool> = report
            .outcomes
            .iter()
            .map(|(task, outcome)| (task.uri(), outcome.is_resolved()))
            .collect();

        let mut unresolved_handles = BTreeSet::new();
        for (uri, owners) in &self.queued {
            if !resolved_uris.get(uri.as_str()).copied().unwrap_or(false) {
                unresolved_handles.extend(owners.iter().cloned());
            }
        }

        let (resolved, mut unresolved): (Vec<JobHandle>, Vec<JobHandle>) = self
            .polled
            .iter()
            .cloned()
            .partition(|handle| !unresolved_handles.contains(handle));
        unresolved.extend(self.failed.iter().cloned());
        unresolved.sort();

        for handle in &resolved {
            self.markers.delete(handle).map_err(ApiError::from)?;
        }
        let audit_log = self
            .markers
            .write_audit_log(&resolved)
            .map_err(ApiError::from)?;

        if !unresolved.is_empty() {
            warn!(count = unresolved.len(), "jobs keep their marker for a later run");
        }

        self.pending.retain(|handle| !resolved.contains(handle));
        self.queued.clear();
        self.polled.clear();
        self.failed.clear();
        self.summary.absorb(&report.summary);

        Ok(CycleReport {
            summary: report.summary,
            resolved,
            unresolved,
            audit_log,
        })
    }

    /// Submits, waits for every pending job and downloads the results.
    ///
    /// # Errors
    ///
    /// Returns the first submission error, an interrupt while polling, or a
    /// fatal dispatch error. Failed status checks only mark a job unresolved.
    pub async fn run(
        &mut self,
        requests: &[Request],
        n_jobs: usize,
        n_proc: usize,
    ) -> Result<CycleReport, DispatchError> {
        self.submit(requests, n_jobs).await?;
        self.queue_pending(true).await?;
        self.download(n_proc).await
    }

    /// Waits for and downloads only jobs already pending or recorded on disk.
    ///
    /// # Errors
    ///
    /// Returns an interrupt while polling or a fatal dispatch error.
    pub async fn resume(&mut self, n_proc: usize) -> Result<CycleReport, DispatchError> {
        self.queue_pending(true).await?;
        self.download(n_proc).await
    }

    /// Gives up on `handle`: deletes its marker and forgets it.
    ///
    /// Resources already queued for the handle are dropped unless another
    /// job shares them. Returns `false` if the handle was neither pending nor
    /// recorded on disk.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError`] if the handle is not a valid marker name or
    /// the marker cannot be removed.
    pub fn abandon(&mut self, handle: &JobHandle) -> Result<bool, MarkerError> {
        let known = self.pending.contains(handle) || self.markers.path_for(handle)?.exists();
        self.markers.delete(handle)?;

        self.pending.retain(|pending| pending != handle);
        self.polled.remove(handle);
        self.failed.remove(handle);
        self.queued.retain(|_, owners| {
            owners.retain(|owner| owner != handle);
            !owners.is_empty()
        });

        if known {
            warn!(handle = %handle, "job abandoned, marker deleted");
        } else {
            debug!(handle = %handle, "nothing to abandon");
        }
        Ok(known)
    }

    fn track(&mut self, handles: impl IntoIterator<Item = JobHandle>) -> usize {
        let mut added = 0;
        for handle in handles {
            if !self.pending.contains(&handle) {
                self.pending.push(handle);
                added += 1;
            }
        }
        added
    }
}
