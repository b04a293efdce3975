//! HTTP API module for filedrop.
//!
//! This module exposes the file management API, the download route and the
//! health probes.

pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use health::Readiness;
pub use router::{create_app, create_router};
pub use server::WebServer;
