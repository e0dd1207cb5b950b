//! Shared fixtures for tests that talk to a mocked backend.

#![allow(dead_code)]

use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::time::Duration;

use serde_json::{Value, json};
use vds_client::{ClientConfig, Session};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Set to `1`, `true` or `yes` to fail mock-backend tests on hosts without
/// loopback sockets instead of skipping them.
const STRICT_SOCKETS_ENV: &str = "VDS_REQUIRE_SOCKET_TESTS";

/// Starts a mock backend, or `None` when this host cannot bind loopback sockets.
///
/// Callers return early on `None`:
///
/// ```ignore
/// let Some(server) = mock_backend().await else { return; };
/// ```
#[track_caller]
pub fn mock_backend() -> impl std::future::Future<Output = Option<MockServer>> {
    let caller = std::panic::Location::caller();
    let loopback = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map(drop);
    async move {
        match loopback {
            Ok(()) => Some(MockServer::start().await),
            Err(error) if strict_sockets() => {
                panic!("{caller}: mock backend needs a loopback socket: {error}")
            }
            Err(error) => {
                eprintln!(
                    "{caller}: no loopback socket ({error}), skipping; \
                     set {STRICT_SOCKETS_ENV}=1 to fail instead"
                );
                None
            }
        }
    }
}

fn strict_sockets() -> bool {
    std::env::var(STRICT_SOCKETS_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Session pointed at the mock backend, with short timeouts.
pub fn session(server: &MockServer) -> Session {
    Session::builder()
        .base_url(server.uri())
        .timeouts(Duration::from_secs(2), Duration::from_millis(500))
        .build()
        .expect("mock session should build")
}

/// Lifecycle config with millisecond retries and polls and no progress bar.
pub fn fast_config(workdir: &Path, outdir: &Path) -> ClientConfig {
    ClientConfig::default()
        .with_marker_dir(workdir)
        .with_output_dir(outdir)
        .with_poll_interval(Duration::from_millis(20))
        .with_retry_delays(Duration::from_millis(5), Duration::from_millis(20))
        .with_progress(false)
}

/// Status endpoint body.
pub fn status_body(percentage: u32, processing_status: &str, data: Option<&[&str]>) -> Value {
    json!({
        "percentage": percentage,
        "processing_status": processing_status,
        "data": data,
    })
}

/// Path of a job's status endpoint.
pub fn status_path(handle: &str) -> String {
    format!("/api/v2/api-requests/{handle}/status")
}

/// Path of a job resource as reported in the status `data` list.
pub fn resource_path(handle: &str, file: &str) -> String {
    format!("/api/v2/api-requests/{handle}/files/{file}")
}

/// Mounts a status endpoint that reports `handle` as complete with `files`.
pub async fn mount_ready(server: &MockServer, handle: &str, files: &[&str]) {
    let data: Vec<String> = files.iter().map(|f| resource_path(handle, f)).collect();
    let data: Vec<&str> = data.iter().map(String::as_str).collect();
    Mock::given(method("GET"))
        .and(path(status_path(handle)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(status_body(100, "ready", Some(data.as_slice()))),
        )
        .mount(server)
        .await;
}

/// Mounts a download endpoint serving `body` for `handle`/`file`.
pub async fn mount_file(server: &MockServer, handle: &str, file: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("{}/download", resource_path(handle, file))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}
