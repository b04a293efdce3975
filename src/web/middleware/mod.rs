//! Middleware for the HTTP API.

pub mod auth;
pub mod cors;

pub use auth::require_api_key;
pub use cors::create_cors_layer;
