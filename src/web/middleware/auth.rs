//! Key-file authentication middleware for the management API.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Apply the coarse gate to every mutating request.
///
/// Reads (`GET`, `HEAD`) and preflights pass through untouched: downloads
/// are guarded per file by the fine gate instead.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return next.run(request).await;
    }

    match state.gate.authorize(request.headers(), request.uri().query()) {
        Ok(()) => next.run(request).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}
