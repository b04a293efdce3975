//! Purge Lifecycle Tests
//!
//! Integration tests covering expiry from upload through purge.

mod common;

use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;

use common::{create_test_context, create_test_context_with_ttl, file_form, TEST_KEY};
use filedrop::{MetadataStore, NewRecord, PurgeEngine};

fn bearer() -> String {
    format!("Bearer {}", TEST_KEY)
}

fn put_file(store: &MetadataStore, name: &str, ttl: Option<Duration>) {
    let path = store.layout().content_path(name);
    std::fs::write(&path, b"0123456789").unwrap();
    store
        .create(NewRecord::new(name, "text/plain", 10).with_ttl(ttl))
        .unwrap();
}

// ============================================================================
// Sweep Tests
// ============================================================================

#[tokio::test]
async fn test_sweep_removes_only_expired() {
    let ctx = create_test_context();
    put_file(&ctx.store, "soon.txt", Some(Duration::from_secs(1)));
    put_file(&ctx.store, "later.txt", Some(Duration::from_secs(3600)));
    put_file(&ctx.store, "never.txt", None);

    let engine = PurgeEngine::new(ctx.store.clone(), Duration::from_secs(60));
    let report = engine.sweep(Utc::now() + chrono::Duration::seconds(2));

    assert_eq!(report.scanned, 3);
    assert_eq!(report.purged, 1);
    assert_eq!(report.failed, 0);

    let layout = ctx.store.layout();
    assert!(!layout.content_path("soon.txt").exists());
    assert!(!layout.record_path("soon.txt").exists());
    assert!(layout.content_path("later.txt").exists());
    assert!(layout.content_path("never.txt").exists());

    ctx.server
        .get("/api/v1/files/soon.txt")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    ctx.server.get("/api/v1/files/later.txt").await.assert_status_ok();
}

#[tokio::test]
async fn test_file_without_ttl_survives_sweeps() {
    let ctx = create_test_context();
    ctx.server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, bearer())
        .multipart(file_form("keep.bin", "application/octet-stream", b"0123456789"))
        .await
        .assert_status_ok();

    let engine = PurgeEngine::new(ctx.store.clone(), Duration::from_secs(60));
    for day in 0..5 {
        let report = engine.sweep(Utc::now() + chrono::Duration::days(day));
        assert_eq!(report.purged, 0);
    }

    let response = ctx.server.get("/api/v1/files/keep.bin").await;
    response.assert_status_ok();
    assert_eq!(response.as_bytes().len(), 10);

    ctx.server
        .delete("/api/v1/files/keep.bin")
        .add_header(AUTHORIZATION, bearer())
        .await
        .assert_status(StatusCode::NO_CONTENT);
    ctx.server
        .get("/api/v1/files/keep.bin")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_default_ttl_is_purged() {
    let ctx = create_test_context_with_ttl(Some(Duration::from_secs(60)));
    ctx.server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, bearer())
        .multipart(file_form("temp.txt", "text/plain", b"temp"))
        .await
        .assert_status_ok();

    let engine = PurgeEngine::new(ctx.store.clone(), Duration::from_secs(60));
    assert_eq!(engine.sweep(Utc::now()).purged, 0);
    assert_eq!(
        engine.sweep(Utc::now() + chrono::Duration::seconds(61)).purged,
        1
    );
    assert!(!ctx.store.layout().content_path("temp.txt").exists());
}

#[tokio::test]
async fn test_past_expiry_from_update_is_purged() {
    let ctx = create_test_context();
    ctx.server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, bearer())
        .multipart(file_form("doc.txt", "text/plain", b"doc"))
        .await
        .assert_status_ok();

    ctx.server
        .patch("/api/v1/files/doc.txt")
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "deleteAt": "2000-01-01T00:00:00Z" }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let engine = PurgeEngine::new(ctx.store.clone(), Duration::from_secs(60));
    assert_eq!(engine.sweep(Utc::now()).purged, 1);
    ctx.server
        .get("/api/v1/files/doc.txt")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_exhausted_download_cap_is_purged() {
    let ctx = create_test_context();
    ctx.server
        .post("/api/v1/files")
        .add_header(AUTHORIZATION, bearer())
        .multipart(file_form("once.txt", "text/plain", b"once"))
        .await
        .assert_status_ok();
    ctx.server
        .patch("/api/v1/files/once.txt")
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "maxDownloads": 1 }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    ctx.server.get("/api/v1/files/once.txt").await.assert_status_ok();

    let engine = PurgeEngine::new(ctx.store.clone(), Duration::from_secs(60));
    assert_eq!(engine.sweep(Utc::now()).purged, 1);
    ctx.server
        .get("/api/v1/files/once.txt")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Engine Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_engine_purges_in_background() {
    let ctx = create_test_context();
    put_file(&ctx.store, "short.txt", Some(Duration::from_millis(1)));

    let handle = PurgeEngine::new(ctx.store.clone(), Duration::from_millis(50)).start();

    let content = ctx.store.layout().content_path("short.txt");
    for _ in 0..100 {
        if !content.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown().await;

    assert!(!content.exists());
    assert!(!ctx.store.layout().record_path("short.txt").exists());
}

#[tokio::test]
async fn test_engine_shutdown_is_idle() {
    let ctx = create_test_context();
    let handle = PurgeEngine::new(ctx.store.clone(), Duration::from_secs(3600)).start();

    assert_eq!(handle.in_flight(), 0);
    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("shutdown should not hang");
}

// ============================================================================
// Health Tests
// ============================================================================

#[tokio::test]
async fn test_health_probes() {
    let ctx = create_test_context();

    ctx.server.get("/healthz/liveness").await.assert_status_ok();
    ctx.server
        .get("/healthz/readiness")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    ctx.readiness.set_ready(true);
    ctx.server.get("/healthz/readiness").await.assert_status_ok();
}
