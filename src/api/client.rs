//! Thin JSON/streaming client over a [`Session`].

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::error::ApiError;
use super::types::{
    BackendStatus, JobHandle, JobStatus, Request, StatusResponse, SubmitResponse, UserInfo,
};
use crate::session::Session;

/// Backend API client.
///
/// Cloning is cheap; clones share the session's connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    session: Session,
}

impl ApiClient {
    /// Creates a client for the given session.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Returns the underlying session.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// GETs a URI and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidUrl`] when `uri` does not parse
    /// - [`ApiError::Network`] / [`ApiError::Timeout`] on transport failure
    /// - [`ApiError::HttpStatus`] on a non-2xx response
    /// - [`ApiError::Decode`] when the body does not match `T`
    #[instrument(level = "debug", skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, uri: &str) -> Result<T, ApiError> {
        let response = self.send(uri).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::http_status(uri, status.as_u16()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::network(uri, e))?;
        serde_json::from_slice(&body).map_err(|e| ApiError::decode(uri, e.to_string()))
    }

    /// GETs a URI and returns the raw response for streaming.
    ///
    /// The status is not checked; callers classify it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`], [`ApiError::Network`] or [`ApiError::Timeout`].
    pub async fn get_stream(&self, uri: &str) -> Result<reqwest::Response, ApiError> {
        self.send(uri).await
    }

    /// Submits a request and returns the job handle assigned by the backend.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn submit(&self, request: &Request) -> Result<JobHandle, ApiError> {
        let body: SubmitResponse = self.get_json(request.uri()).await?;
        Ok(body.uuid)
    }

    /// Fetches the current status of a job.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn status(&self, handle: &JobHandle) -> Result<JobStatus, ApiError> {
        let body: StatusResponse = self.get_json(&self.status_uri(handle)).await?;
        Ok(body.into())
    }

    /// Fetches the service status, which carries the backend version.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn backend_status(&self) -> Result<BackendStatus, ApiError> {
        self.get_json(&self.session.url("/api/v2/status/")).await
    }

    /// Fetches account details of the session's user.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn user_info(&self) -> Result<UserInfo, ApiError> {
        self.get_json(&self.session.url("/api/v2/users/me")).await
    }

    /// Status endpoint for a job handle.
    #[must_use]
    pub fn status_uri(&self, handle: &JobHandle) -> String {
        self.session
            .url(&format!("/api/v2/api-requests/{handle}/status"))
    }

    /// Download URI for a resource location reported by the status endpoint.
    #[must_use]
    pub fn resource_uri(&self, location: &str) -> String {
        if location.starts_with("http://") || location.starts_with("https://") {
            return format!("{}/download", location.trim_end_matches('/'));
        }
        self.session.url(&format!("{location}/download"))
    }

    async fn send(&self, uri: &str) -> Result<reqwest::Response, ApiError> {
        Url::parse(uri).map_err(|_| ApiError::invalid_url(uri))?;
        debug!(uri, "GET");
        self.session
            .get(uri)
            .send()
            .await
            .map_err(|e| ApiError::network(uri, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(
            Session::builder()
                .base_url("http://127.0.0.1:1")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_status_uri() {
        let api = client();
        assert_eq!(
            api.status_uri(&JobHandle::new("abc")),
            "http://127.0.0.1:1/api/v2/api-requests/abc/status"
        );
    }

    #[test]
    fn test_resource_uri_relative_and_absolute() {
        let api = client();
        assert_eq!(
            api.resource_uri("/api/v2/api-requests/abc/files/a.tif"),
            "http://127.0.0.1:1/api/v2/api-requests/abc/files/a.tif/download"
        );
        assert_eq!(
            api.resource_uri("https://cdn.example.com/a.tif"),
            "https://cdn.example.com/a.tif/download"
        );
    }

    #[tokio::test]
    async fn test_get_json_invalid_url() {
        let api = client();
        let result: Result<serde_json::Value, _> = api.get_json("not-a-url").await;
        assert!(matches!(result, Err(ApiError::InvalidUrl { .. })));
    }
}
