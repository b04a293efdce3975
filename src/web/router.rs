//! Router configuration for the HTTP API.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{delete_file, download_file, update_file, upload_file, AppState};
use super::health::{create_health_router, Readiness};
use super::middleware::{create_cors_layer, require_api_key};

/// Create the main API router.
///
/// Uploads, updates and deletes go through the key-file gate; downloads
/// only through the per-file password check.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let file_routes = Router::new()
        .route("/files", post(upload_file))
        .route(
            "/files/*path",
            get(download_file).patch(update_file).delete(delete_file),
        )
        .layer(DefaultBodyLimit::max(app_state.max_upload_size))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_api_key,
        ));

    Router::new()
        .nest("/api/v1", file_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(app_state)
}

/// Create the full application: API plus health probes.
pub fn create_app(app_state: Arc<AppState>, readiness: Readiness, cors_origins: &[String]) -> Router {
    create_router(app_state, cors_origins).merge(create_health_router(readiness))
}
