//! Backend API: error taxonomy, wire types and the HTTP client.

mod client;
mod error;
mod types;

pub use client::ApiClient;
pub use error::ApiError;
pub use types::{
    AllowedArea, AreaExtent, BackendStatus, JobHandle, JobStatus, Readiness, Request, UserInfo,
};
