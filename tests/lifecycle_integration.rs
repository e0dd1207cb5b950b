//! End-to-end job lifecycle tests: submit, poll, download and marker reconciliation.

mod support;

use chrono::NaiveDate;
use serde_json::json;
use support::{
    fast_config, mock_backend, mount_file, mount_ready, resource_path, session, status_path,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vds_client::{
    GriddedDataRequest, JobHandle, LifecycleCoordinator, MarkerStore, NO_DATA_SENTINEL, Request,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn coordinator(server: &MockServer, work: &TempDir, out: &TempDir) -> LifecycleCoordinator {
    LifecycleCoordinator::new(
        session(server),
        &fast_config(work.path(), out.path()),
        CancellationToken::new(),
    )
    .unwrap()
}

async fn mount_split(server: &MockServer, start: &str, end: &str, handle: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v2/products/SM-SMAP-L-DESC_V4.0_100/gridded-data"))
        .and(query_param("start_date", start))
        .and(query_param("end_date", end))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": handle })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_gridded_run_downloads_every_split_and_clears_markers() {
    let Some(server) = mock_backend().await else {
        return;
    };
    mount_split(&server, "2024-01-01", "2024-01-01", "job-a").await;
    mount_split(&server, "2024-01-02", "2024-01-03", "job-b").await;
    mount_ready(&server, "job-a", &["SM_20240101.tif"]).await;
    mount_ready(&server, "job-b", &["SM_20240102.tif"]).await;
    mount_file(&server, "job-a", "SM_20240101.tif", b"day one").await;
    mount_file(&server, "job-b", "SM_20240102.tif", b"day two").await;

    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let session = session(&server);

    let requests = GriddedDataRequest::new(
        vec!["SM-SMAP-L-DESC_V4.0_100".to_string()],
        date("2024-01-01"),
        date("2024-01-03"),
        (3.5, 4.0),
        (51.0, 51.5),
    )
    .with_nrequests(2)
    .build(&session)
    .unwrap();
    assert_eq!(requests.len(), 2);

    let mut coordinator = coordinator(&server, &work, &out);
    let report = coordinator.run(&requests, 2, 2).await.unwrap();

    assert_eq!(report.summary.outputs, 2);
    assert_eq!(report.resolved.len(), 2);
    assert!(report.unresolved.is_empty());
    assert_eq!(std::fs::read(out.path().join("SM_20240101.tif")).unwrap(), b"day one");
    assert_eq!(std::fs::read(out.path().join("SM_20240102.tif")).unwrap(), b"day two");

    assert!(MarkerStore::new(work.path()).scan().unwrap().is_empty());
    assert!(coordinator.pending().is_empty());

    let audit = std::fs::read_to_string(report.audit_log.unwrap()).unwrap();
    let mut logged: Vec<&str> = audit.lines().collect();
    logged.sort_unstable();
    assert_eq!(logged, vec!["job-a", "job-b"]);
}

#[tokio::test]
async fn test_resume_finishes_jobs_left_by_an_earlier_run() {
    let Some(server) = mock_backend().await else {
        return;
    };
    mount_ready(&server, "job-old", &["a.tif", "b.tif"]).await;
    mount_file(&server, "job-old", "a.tif", b"a").await;
    mount_file(&server, "job-old", "b.tif", b"b").await;

    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let handle = JobHandle::new("job-old");
    MarkerStore::new(work.path())
        .put(&handle, &Request::new(format!("{}/submit", server.uri())))
        .unwrap();

    let mut coordinator = coordinator(&server, &work, &out);
    assert_eq!(coordinator.pending(), &[handle.clone()]);

    let report = coordinator.resume(4).await.unwrap();

    assert_eq!(report.resolved, vec![handle]);
    assert_eq!(report.summary.outputs, 2);
    assert!(out.path().join("a.tif").exists());
    assert!(out.path().join("b.tif").exists());
    assert!(MarkerStore::new(work.path()).scan().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_resource_keeps_marker_for_next_run() {
    let Some(server) = mock_backend().await else {
        return;
    };
    mount_ready(&server, "job-x", &["ok.tif", "broken.tif"]).await;
    mount_file(&server, "job-x", "ok.tif", b"ok").await;
    Mock::given(method("GET"))
        .and(path(format!("{}/download", resource_path("job-x", "broken.tif"))))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let handle = JobHandle::new("job-x");
    MarkerStore::new(work.path())
        .put(&handle, &Request::new(format!("{}/submit", server.uri())))
        .unwrap();

    let mut coordinator = coordinator(&server, &work, &out);
    let report = coordinator.resume(2).await.unwrap();

    assert_eq!(report.summary.outputs, 1);
    assert_eq!(report.summary.failed, 1);
    assert!(report.resolved.is_empty());
    assert_eq!(report.unresolved, vec![handle.clone()]);
    assert!(report.audit_log.is_none());
    assert_eq!(MarkerStore::new(work.path()).scan().unwrap(), vec![handle.clone()]);
    assert_eq!(coordinator.pending(), &[handle]);
}

#[tokio::test]
async fn test_second_run_skips_files_already_on_disk() {
    let Some(server) = mock_backend().await else {
        return;
    };
    mount_ready(&server, "job-y", &["ok.tif", "later.tif"]).await;
    mount_file(&server, "job-y", "ok.tif", b"ok").await;
    Mock::given(method("GET"))
        .and(path(format!("{}/download", resource_path("job-y", "later.tif"))))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_file(&server, "job-y", "later.tif", b"later").await;

    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    MarkerStore::new(work.path())
        .put(&JobHandle::new("job-y"), &Request::new(format!("{}/submit", server.uri())))
        .unwrap();

    let first = coordinator(&server, &work, &out).resume(1).await.unwrap();
    assert_eq!(first.summary.failed, 1);

    let second = coordinator(&server, &work, &out).resume(1).await.unwrap();
    assert_eq!(second.summary.skipped_existing, 1);
    assert_eq!(second.summary.outputs, 1);
    assert_eq!(second.resolved, vec![JobHandle::new("job-y")]);
    assert!(MarkerStore::new(work.path()).scan().unwrap().is_empty());
}

#[tokio::test]
async fn test_no_data_resource_counts_as_resolved() {
    let Some(server) = mock_backend().await else {
        return;
    };
    mount_ready(&server, "job-z", &["empty.tif"]).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/download", resource_path("job-z", "empty.tif"))))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Content-Disposition",
                    format!("attachment; filename={NO_DATA_SENTINEL}").as_str(),
                )
                .set_body_bytes(b"PNG".to_vec()),
        )
        .mount(&server)
        .await;

    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    MarkerStore::new(work.path())
        .put(&JobHandle::new("job-z"), &Request::new(format!("{}/submit", server.uri())))
        .unwrap();

    let mut coordinator = coordinator(&server, &work, &out);
    let report = coordinator.resume(1).await.unwrap();

    assert_eq!(report.summary.skipped_no_data, 1);
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    assert!(MarkerStore::new(work.path()).scan().unwrap().is_empty());
}

#[tokio::test]
async fn test_summary_accumulates_across_cycles() {
    let Some(server) = mock_backend().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/submit/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "job-1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/submit/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uuid": "job-2" })))
        .mount(&server)
        .await;
    mount_ready(&server, "job-1", &["one.tif"]).await;
    mount_ready(&server, "job-2", &["two.tif"]).await;
    mount_file(&server, "job-1", "one.tif", b"1").await;
    mount_file(&server, "job-2", "two.tif", b"2").await;

    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut coordinator = coordinator(&server, &work, &out);

    coordinator
        .run(&[Request::new(format!("{}/submit/1", server.uri()))], 1, 1)
        .await
        .unwrap();
    coordinator
        .run(&[Request::new(format!("{}/submit/2", server.uri()))], 1, 1)
        .await
        .unwrap();

    assert_eq!(coordinator.summary().outputs, 2);
    assert_eq!(coordinator.summary().total(), 2);
    assert!(coordinator.pending().is_empty());
}

async fn mount_expired(server: &MockServer, handle: &str) {
    Mock::given(method("GET"))
        .and(path(status_path(handle)))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_dead_job_does_not_block_healthy_jobs() {
    let Some(server) = mock_backend().await else {
        return;
    };
    mount_expired(&server, "aaa-dead").await;
    mount_ready(&server, "zzz-good", &["good.tif"]).await;
    mount_file(&server, "zzz-good", "good.tif", b"good").await;

    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let store = MarkerStore::new(work.path());
    let request = Request::new(format!("{}/submit", server.uri()));
    store.put(&JobHandle::new("aaa-dead"), &request).unwrap();
    store.put(&JobHandle::new("zzz-good"), &request).unwrap();

    for _ in 0..2 {
        let mut coordinator = coordinator(&server, &work, &out);
        let report = coordinator.resume(2).await.unwrap();
        assert_eq!(report.unresolved, vec![JobHandle::new("aaa-dead")]);
        assert_eq!(coordinator.pending(), &[JobHandle::new("aaa-dead")]);
    }

    assert_eq!(std::fs::read(out.path().join("good.tif")).unwrap(), b"good");
    assert_eq!(store.scan().unwrap(), vec![JobHandle::new("aaa-dead")]);
}

#[tokio::test]
async fn test_abandoned_job_is_not_polled_again() {
    let Some(server) = mock_backend().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path(status_path("aaa-dead")))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;
    mount_ready(&server, "zzz-good", &["good.tif"]).await;
    mount_file(&server, "zzz-good", "good.tif", b"good").await;

    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let store = MarkerStore::new(work.path());
    let request = Request::new(format!("{}/submit", server.uri()));
    store.put(&JobHandle::new("aaa-dead"), &request).unwrap();
    store.put(&JobHandle::new("zzz-good"), &request).unwrap();

    let mut coordinator = coordinator(&server, &work, &out);
    assert!(coordinator.abandon(&JobHandle::new("aaa-dead")).unwrap());
    let report = coordinator.resume(2).await.unwrap();

    assert_eq!(report.resolved, vec![JobHandle::new("zzz-good")]);
    assert!(report.unresolved.is_empty());
    assert!(store.scan().unwrap().is_empty());
}
