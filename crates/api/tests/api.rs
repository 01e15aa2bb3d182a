//! Integration tests for the HTTP surface, driven through the router with
//! the in-memory job store and temporary storage roots.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use demo2apk_api::routes::build_router;
use demo2apk_api::state::AppState;
use demo2apk_core::config::AppConfig;
use demo2apk_core::types::BuildKind;
use demo2apk_queue::{BuildResult, JobStore, MemoryJobStore, NewTask};

const BOUNDARY: &str = "demo2apk-test-boundary";

struct TestApp {
    app: Router,
    store: Arc<MemoryJobStore>,
    config: AppConfig,
    _builds: TempDir,
    _uploads: TempDir,
}

fn test_app_with(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    let builds = TempDir::new().unwrap();
    let uploads = TempDir::new().unwrap();

    let mut config = AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        builds_dir: builds.path().to_path_buf(),
        uploads_dir: uploads.path().to_path_buf(),
        database_url: "postgres://unused".to_string(),
        max_file_size: 31_457_280,
        rate_limit_max: 5,
        rate_limit_max_auth: 20,
        rate_limit_window_secs: 3600,
        rate_limit_enabled: true,
        worker_concurrency: 2,
        file_retention_hours: 2,
        mock_build: true,
        log_level: "info".to_string(),
        auth_token: None,
    };
    configure(&mut config);

    let store = Arc::new(MemoryJobStore::new());
    let state = AppState::new(
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(config.clone()),
    );
    TestApp {
        app: build_router(state),
        store,
        config,
        _builds: builds,
        _uploads: uploads,
    }
}

fn test_app() -> TestApp {
    test_app_with(|_| {})
}

/// One multipart part: (field name, optional filename, bytes).
fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-forwarded-for", "198.51.100.7")
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn html_upload() -> (&'static str, Option<&'static str>, &'static [u8]) {
    (
        "file",
        Some("hello.html"),
        b"<!doctype html><html><body>Hi</body></html>",
    )
}

fn seed_task(id: &str, app_name: &str, upload_path: &str) -> NewTask {
    NewTask {
        task_id: id.to_string(),
        kind: BuildKind::Html,
        app_name: app_name.to_string(),
        app_id: "com.vibecoding.app".to_string(),
        upload_path: upload_path.to_string(),
        icon_path: None,
    }
}

// ---------------------------------------------------------------------------
// Liveness and metadata
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let t = test_app();
    let response = get(&t.app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn service_metadata_lists_endpoints_and_limits() {
    let t = test_app();
    let response = get(&t.app, "/api").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["name"], "demo2apk");
    assert_eq!(json["limits"]["maxFileSize"], 31_457_280u64);
}

#[tokio::test]
async fn responses_carry_a_trace_id() {
    let t = test_app();
    let response = get(&t.app, "/health").await;

    let trace = response
        .headers()
        .get("x-request-id")
        .expect("Response must carry an x-request-id header")
        .to_str()
        .unwrap();
    assert_eq!(trace.len(), 16);
    assert!(trace.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let t = test_app();
    let response = get(&t.app, "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn html_submission_admits_a_pending_task() {
    let t = test_app();
    let request = multipart_request(
        "/api/build/html",
        &[html_upload(), ("appName", None, b"HelloApp")],
    );
    let response = send(&t.app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let task_id = json["taskId"].as_str().unwrap();
    assert_eq!(task_id.len(), 12);
    assert_eq!(json["status"], "pending");
    assert_eq!(
        json["statusUrl"],
        format!("/api/build/{task_id}/status")
    );

    // The upload landed in the per-task workspace.
    let stored = t.config.uploads_dir.join(task_id).join("hello.html");
    assert!(stored.is_file());

    // The queue has exactly one waiting job with the derived metadata.
    let job = t.store.get(task_id).await.unwrap().unwrap();
    assert_eq!(job.app_name, "HelloApp");
    assert_eq!(job.app_id, "com.vibecoding.helloapp");
    assert_eq!(job.kind, "html");
}

#[tokio::test]
async fn app_name_falls_back_to_the_upload_stem() {
    let t = test_app();
    let request = multipart_request("/api/build/html", &[html_upload()]);
    let json = body_json(send(&t.app, request).await).await;
    let job = t
        .store
        .get(json["taskId"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.app_name, "hello");
}

#[tokio::test]
async fn wrong_extension_is_rejected() {
    let t = test_app();
    let request = multipart_request(
        "/api/build/html",
        &[("file", Some("app.zip"), b"PK\x03\x04" as &[u8])],
    );
    let response = send(&t.app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Bad Request");
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let t = test_app();
    let request = multipart_request("/api/build/zip", &[("appName", None, b"NoFile")]);
    let response = send(&t.app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bad_icon_extension_is_rejected() {
    let t = test_app();
    let request = multipart_request(
        "/api/build/html",
        &[html_upload(), ("icon", Some("icon.gif"), b"GIF89a" as &[u8])],
    );
    let response = send(&t.app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn third_submission_in_the_window_is_limited() {
    let t = test_app_with(|c| c.rate_limit_max = 2);

    for _ in 0..2 {
        let response = send(
            &t.app,
            multipart_request("/api/build/html", &[html_upload()]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(
        &t.app,
        multipart_request("/api/build/html", &[html_upload()]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let json = body_json(response).await;
    assert_eq!(json["error"], "Too Many Requests");
    let retry_after = json["retryAfter"].as_u64().unwrap();
    assert!(retry_after >= 1 && retry_after <= 3600);
}

#[tokio::test]
async fn bearer_token_unlocks_the_higher_quota() {
    let t = test_app_with(|c| {
        c.rate_limit_max = 1;
        c.auth_token = Some("sekrit".to_string());
    });

    for _ in 0..3 {
        let mut request = multipart_request("/api/build/html", &[html_upload()]);
        request.headers_mut().insert(
            header::AUTHORIZATION,
            "Bearer sekrit".parse().unwrap(),
        );
        let response = send(&t.app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn disabled_rate_limit_admits_everything() {
    let t = test_app_with(|c| {
        c.rate_limit_max = 1;
        c.rate_limit_enabled = false;
    });
    for _ in 0..4 {
        let response = send(
            &t.app,
            multipart_request("/api/build/html", &[html_upload()]),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn status_polling_is_never_rate_limited() {
    let t = test_app_with(|c| c.rate_limit_max = 1);
    for _ in 0..5 {
        let response = get(&t.app, "/api/build/unknown000000/status").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_status_reports_queue_position() {
    let t = test_app();
    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "First", "/up/1"))
        .await
        .unwrap();
    t.store
        .enqueue(&seed_task("taskAAAAAAA2", "Second", "/up/2"))
        .await
        .unwrap();

    let json = body_json(get(&t.app, "/api/build/taskAAAAAAA2/status").await).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["queuePosition"], 2);
    assert_eq!(json["queueTotal"], 2);
    assert_eq!(json["retentionHours"], 2);
}

#[tokio::test]
async fn active_status_reports_progress() {
    let t = test_app();
    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "App", "/up/1"))
        .await
        .unwrap();
    t.store.claim_next().await.unwrap().unwrap();
    t.store
        .update_progress("taskAAAAAAA1", 42, "Syncing web resources")
        .await
        .unwrap();

    let json = body_json(get(&t.app, "/api/build/taskAAAAAAA1/status").await).await;
    assert_eq!(json["status"], "active");
    assert_eq!(json["progress"]["percent"], 42);
    assert_eq!(json["progress"]["message"], "Syncing web resources");
}

#[tokio::test]
async fn logical_build_failure_reads_as_failed() {
    let t = test_app();
    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "App", "/up/1"))
        .await
        .unwrap();
    t.store.claim_next().await.unwrap().unwrap();
    t.store
        .complete(
            "taskAAAAAAA1",
            &BuildResult::failure("gradle exited 1".to_string(), 77),
        )
        .await
        .unwrap();

    let json = body_json(get(&t.app, "/api/build/taskAAAAAAA1/status").await).await;
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error"], "gradle exited 1");
    assert_eq!(json["result"]["success"], false);
}

#[tokio::test]
async fn completed_status_links_the_artifact() {
    let t = test_app();
    let apk = t.config.builds_dir.join("App--taskAAAAAAA1.apk");
    std::fs::write(&apk, b"apk-bytes").unwrap();

    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "App", "/up/1"))
        .await
        .unwrap();
    t.store.claim_next().await.unwrap().unwrap();
    t.store
        .complete(
            "taskAAAAAAA1",
            &BuildResult::success(apk.to_string_lossy().into_owned(), 90),
        )
        .await
        .unwrap();

    let json = body_json(get(&t.app, "/api/build/taskAAAAAAA1/status").await).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["result"]["success"], true);
    assert_eq!(json["result"]["duration"], 90);
    assert_eq!(json["fileName"], "App.apk");
    assert_eq!(json["apkSize"], 9);
    assert_eq!(
        json["downloadUrl"],
        "/api/build/taskAAAAAAA1/download"
    );
    assert!(json["expiresAt"].is_string());
}

#[tokio::test]
async fn unknown_task_status_is_404() {
    let t = test_app();
    let response = get(&t.app, "/api/build/doesNotExist/status").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Not Found");
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_before_completion_is_rejected() {
    let t = test_app();
    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "App", "/up/1"))
        .await
        .unwrap();

    let response = get(&t.app, "/api/build/taskAAAAAAA1/download").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_of_failed_build_is_rejected() {
    let t = test_app();
    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "App", "/up/1"))
        .await
        .unwrap();
    t.store.claim_next().await.unwrap().unwrap();
    t.store.fail("taskAAAAAAA1", "boom").await.unwrap();

    let response = get(&t.app, "/api/build/taskAAAAAAA1/download").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_streams_the_artifact_with_apk_headers() {
    let t = test_app();
    let apk = t.config.builds_dir.join("HelloApp--taskAAAAAAA1.apk");
    std::fs::write(&apk, b"definitely-an-apk").unwrap();

    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "HelloApp", "/up/1"))
        .await
        .unwrap();
    t.store.claim_next().await.unwrap().unwrap();
    t.store
        .complete(
            "taskAAAAAAA1",
            &BuildResult::success(apk.to_string_lossy().into_owned(), 10),
        )
        .await
        .unwrap();

    let response = get(&t.app, "/api/build/taskAAAAAAA1/download").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/vnd.android.package-archive"
    );
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap();
    // The internal task-id suffix is stripped from the user-facing name.
    assert!(disposition.contains("filename=\"HelloApp.apk\""), "{disposition}");
    assert!(disposition.contains("filename*=UTF-8''HelloApp.apk"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"definitely-an-apk");
}

#[tokio::test]
async fn download_of_a_reclaimed_artifact_is_404() {
    let t = test_app();
    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "App", "/up/1"))
        .await
        .unwrap();
    t.store.claim_next().await.unwrap().unwrap();
    t.store
        .complete(
            "taskAAAAAAA1",
            &BuildResult::success("/gone/App--taskAAAAAAA1.apk".to_string(), 10),
        )
        .await
        .unwrap();

    let response = get(&t.app, "/api/build/taskAAAAAAA1/download").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn static_downloads_prefix_serves_artifacts_verbatim() {
    let t = test_app();
    std::fs::write(t.config.builds_dir.join("Raw--taskAAAAAAA1.apk"), b"raw").unwrap();

    let response = get(&t.app, "/downloads/Raw--taskAAAAAAA1.apk").await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"raw");
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_unknown_task_is_404() {
    let t = test_app();
    let response = send(
        &t.app,
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/build/doesNotExist")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_active_job_is_rejected_and_leaves_it_running() {
    let t = test_app();
    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "App", "/up/1"))
        .await
        .unwrap();
    t.store.claim_next().await.unwrap().unwrap();

    let response = send(
        &t.app,
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/build/taskAAAAAAA1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(t.store.get("taskAAAAAAA1").await.unwrap().is_some());
}

#[tokio::test]
async fn delete_completed_job_reclaims_queue_entry_and_files() {
    let t = test_app();

    let upload_dir = t.config.uploads_dir.join("taskAAAAAAA1");
    std::fs::create_dir_all(&upload_dir).unwrap();
    std::fs::write(upload_dir.join("hello.html"), b"<html></html>").unwrap();
    let apk = t.config.builds_dir.join("App--taskAAAAAAA1.apk");
    std::fs::write(&apk, b"apk").unwrap();

    t.store
        .enqueue(&seed_task("taskAAAAAAA1", "App", "/up/1"))
        .await
        .unwrap();
    t.store.claim_next().await.unwrap().unwrap();
    t.store
        .complete(
            "taskAAAAAAA1",
            &BuildResult::success(apk.to_string_lossy().into_owned(), 10),
        )
        .await
        .unwrap();

    let response = send(
        &t.app,
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/build/taskAAAAAAA1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(t.store.get("taskAAAAAAA1").await.unwrap().is_none());
    assert!(!upload_dir.exists());
    assert!(!apk.exists());
}
