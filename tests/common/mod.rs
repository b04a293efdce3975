//! Test helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use tempfile::TempDir;
use url::Url;

use filedrop::auth::AccessGate;
use filedrop::file::MetadataStore;
use filedrop::web::{create_app, AppState, Readiness};

/// Key accepted by the management API in tests.
pub const TEST_KEY: &str = "test-key";

/// Storage URL handed out in tests.
pub const STORAGE_URL: &str = "http://localhost:8080/api/v1/files/";

/// A server over a fresh storage tree.
pub struct TestContext {
    pub temp_dir: TempDir,
    pub server: TestServer,
    pub store: MetadataStore,
    pub readiness: Readiness,
}

/// Create a test server without a default TTL.
pub fn create_test_context() -> TestContext {
    create_test_context_with_ttl(None)
}

/// Create a test server with the given default TTL.
pub fn create_test_context_with_ttl(default_ttl: Option<Duration>) -> TestContext {
    create_test_context_with(|state| state.with_default_ttl(default_ttl))
}

/// Create a test server with the given upload size limit in bytes.
pub fn create_test_context_with_limit(max_upload_size: usize) -> TestContext {
    create_test_context_with(|state| state.with_max_upload_size(max_upload_size))
}

fn create_test_context_with<F>(configure: F) -> TestContext
where
    F: FnOnce(AppState) -> AppState,
{
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let root = temp_dir.path().join("storage");
    let store = MetadataStore::open(&root, root.join(".meta")).expect("Failed to open store");

    let auth_root = root.join(".auth");
    fs::create_dir_all(&auth_root).expect("Failed to create auth root");
    fs::write(auth_root.join(TEST_KEY), b"").expect("Failed to create key");

    let state = configure(AppState::new(
        store.clone(),
        AccessGate::new(&auth_root),
        Url::parse(STORAGE_URL).unwrap(),
    ));

    let readiness = Readiness::new();
    let router = create_app(Arc::new(state), readiness.clone(), &[]);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestContext {
        temp_dir,
        server,
        store,
        readiness,
    }
}

/// Entries left in the upload staging directory.
pub fn staged_files(store: &MetadataStore) -> usize {
    fs::read_dir(store.layout().staging_root())
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Multipart form with a single file part.
pub fn file_form(filename: &str, mime: &str, content: &[u8]) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(content.to_vec())
            .file_name(filename)
            .mime_type(mime),
    )
}
