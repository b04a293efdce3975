//! Liveness and readiness probes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

/// Whether the server accepts traffic.
///
/// Owned by the server lifecycle: it turns ready once the listener is bound
/// and not ready as soon as shutdown starts.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    /// Create a readiness flag, initially not ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the flag.
    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    /// Current state.
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Create the probe router.
pub fn create_health_router(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz/liveness", get(liveness))
        .route("/healthz/readiness", get(readiness_probe))
        .with_state(readiness)
}

/// Always answers while the process runs.
async fn liveness() -> Json<Value> {
    Json(json!({}))
}

/// 200 while ready, 503 otherwise.
async fn readiness_probe(State(readiness): State<Readiness>) -> (StatusCode, Json<Value>) {
    if readiness.is_ready() {
        (StatusCode::OK, Json(json!({})))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})))
    }
}
