//! Asynchronous job lifecycle: submission, status polling and orchestration.

mod lifecycle;
mod poller;
mod submitter;

pub use lifecycle::{CycleReport, LifecycleCoordinator};
pub use poller::StatusPoller;
pub use submitter::{JobSubmitter, MAX_SUBMIT_JOBS, dedup_requests, effective_jobs};
