use avatar_staging::config::StagingConfig;
use avatar_staging::services::clock::ManualClock;
use avatar_staging::services::temp_avatar::TempAvatarStore;
use avatar_staging::{AppState, create_app};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

struct TestApp {
    _staging: TempDir,
    clock: Arc<ManualClock>,
    store: Arc<TempAvatarStore>,
    app: Router,
}

async fn setup(max_file_size: usize) -> TestApp {
    let _ = tracing_subscriber::fmt::try_init();
    let staging = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::default());
    let config = StagingConfig {
        max_file_size,
        ..StagingConfig::with_dir(staging.path())
    };
    let store = Arc::new(TempAvatarStore::new(config, clock.clone()));
    store.ensure_staging_dir().await.unwrap();

    let app = create_app(AppState::new(store.clone()));
    TestApp {
        _staging: staging,
        clock,
        store,
        app,
    }
}

fn jpeg_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    data.resize(len, 0x42);
    data
}

fn multipart_body(filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\n\
            Content-Disposition: form-data; name=\"purpose\"\r\n\r\n\
            chat-avatar\r\n\
            --{boundary}\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
            Content-Type: {content_type}\r\n\r\n",
            boundary = BOUNDARY,
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(owner: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/temp-avatars")
        .header("x-user-id", owner)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn owner_request(method: &str, uri: &str, owner: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user-id", owner)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_upload_then_promote_flow() {
    let t = setup(5 * 1024 * 1024).await;
    let data = jpeg_bytes(1024);

    let (status, json) = send(
        &t.app,
        upload_request("42", multipart_body("avatar.jpg", "image/jpeg", &data)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", json);

    let handle = json["handle"].as_str().unwrap().to_string();
    assert_eq!(json["owner_id"], "42");
    assert_eq!(json["mime_type"], "image/jpeg");
    assert_eq!(json["byte_size"], 1024);
    assert!(
        json["preview_data_url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,")
    );
    assert!(json.get("staged_path").is_none());

    let (status, json) = send(&t.app, owner_request("GET", "/temp-avatars", "42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = send(
        &t.app,
        owner_request("POST", &format!("/temp-avatars/{}/promote", handle), "42"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["file_name"], "avatar.jpg");
    let decoded = STANDARD
        .decode(json["base64_data"].as_str().unwrap())
        .unwrap();
    assert_eq!(decoded, data);

    let (status, _) = send(
        &t.app,
        owner_request("GET", &format!("/temp-avatars/{}", handle), "42"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_requires_owner_identity() {
    let t = setup(5 * 1024 * 1024).await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/temp-avatars")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_foreign_handles_are_invisible() {
    let t = setup(5 * 1024 * 1024).await;
    let (_, json) = send(
        &t.app,
        upload_request("alice", multipart_body("a.jpg", "image/jpeg", &jpeg_bytes(256))),
    )
    .await;
    let handle = json["handle"].as_str().unwrap().to_string();

    for (method, uri) in [
        ("GET", format!("/temp-avatars/{}", handle)),
        ("DELETE", format!("/temp-avatars/{}", handle)),
        ("POST", format!("/temp-avatars/{}/promote", handle)),
    ] {
        let (status, _) = send(&t.app, owner_request(method, &uri, "mallory")).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
    }

    let (_, json) = send(&t.app, owner_request("GET", "/temp-avatars", "mallory")).await;
    assert!(json.as_array().unwrap().is_empty());

    // Still intact for the real owner
    assert!(t.store.get(&handle).await.is_some());
    let (status, _) = send(
        &t.app,
        owner_request("DELETE", &format!("/temp-avatars/{}", handle), "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &t.app,
        owner_request("DELETE", &format!("/temp-avatars/{}", handle), "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_bad_uploads() {
    let t = setup(2048).await;

    let (status, _) = send(
        &t.app,
        upload_request("1", multipart_body("doc.pdf", "application/pdf", b"%PDF-1.7 hello")),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = send(
        &t.app,
        upload_request("1", multipart_body("fake.png", "image/png", b"not really a png")),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = send(
        &t.app,
        upload_request("1", multipart_body("big.jpg", "image/jpeg", &jpeg_bytes(4096))),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let no_file = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"purpose\"\r\n\r\n\
        chat-avatar\r\n\
        --{boundary}--\r\n",
        boundary = BOUNDARY
    );
    let (status, _) = send(&t.app, upload_request("1", no_file.into_bytes())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(t.store.stats().total, 0);
}

#[tokio::test]
async fn test_expired_upload_cannot_be_promoted() {
    let t = setup(5 * 1024 * 1024).await;
    let (_, json) = send(
        &t.app,
        upload_request("42", multipart_body("a.jpg", "image/jpeg", &jpeg_bytes(128))),
    )
    .await;
    let handle = json["handle"].as_str().unwrap().to_string();

    t.clock.advance(chrono::Duration::minutes(4));

    let (status, _) = send(
        &t.app,
        owner_request("POST", &format!("/temp-avatars/{}/promote", handle), "42"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(t.store.stats().total, 0);
}

#[tokio::test]
async fn test_stats_and_health() {
    let t = setup(5 * 1024 * 1024).await;
    send(
        &t.app,
        upload_request("42", multipart_body("a.jpg", "image/jpeg", &jpeg_bytes(128))),
    )
    .await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/temp-avatars/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["active"], 1);
    assert_eq!(json["expired"], 0);

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-123");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["staging"], "ready");
    assert_eq!(json["pending_uploads"], 1);
}
