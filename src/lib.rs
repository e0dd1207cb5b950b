//! VanderSat API client library
//!
//! Retrieves geospatial data products from the processing backend: request
//! URIs are built from a validated configuration, submitted as asynchronous
//! jobs, polled until ready and the resulting files downloaded in parallel.
//! Every accepted job is recorded as a marker file in the working directory
//! until its resources are on disk, so interrupted runs can be resumed.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`session`] - Backend host, credentials, headers and the shared HTTP client
//! - [`api`] - Wire types, error taxonomy and the JSON/streaming client
//! - [`retry`] - Retry policies with exponential backoff and error classifiers
//! - [`marker`] - Durable per-job marker files and the audit log
//! - [`jobs`] - Job submitter, status poller and lifecycle coordinator
//! - [`download`] - Parallel download dispatcher and run summary
//! - [`catalog`] - Product and ROI lookup tables
//! - [`endpoints`] - Request URI templates for gridded data and time series

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod catalog;
pub mod config;
pub mod download;
pub mod endpoints;
pub mod jobs;
pub mod marker;
pub mod retry;
pub mod session;
mod user_agent;

// Re-export commonly used types
pub use api::{
    AllowedArea, ApiClient, ApiError, AreaExtent, BackendStatus, JobHandle, JobStatus, Readiness,
    Request, UserInfo,
};
pub use catalog::{Catalog, CatalogError, Product, Products, Roi, Rois};
pub use config::ClientConfig;
pub use download::{
    DispatchError, DispatchReport, DownloadDispatcher, DownloadOutcome, DownloadTask,
    NO_DATA_SENTINEL, RunSummary,
};
pub use endpoints::{
    AvgWindowDirection, GridFormat, GriddedDataRequest, RequestError, TimeSeriesFormat,
    TimeSeriesRequest,
};
pub use jobs::{CycleReport, JobSubmitter, LifecycleCoordinator, StatusPoller};
pub use marker::{MarkerError, MarkerStore};
pub use retry::{FailureType, RetryDecision, RetryPolicy};
pub use session::{Credentials, Environment, Session, SessionBuilder, SessionError};
