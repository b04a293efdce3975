//! filedrop - a small file-drop service.
//!
//! Clients upload files and get back a content URL. Each file may carry a
//! time-to-live, a download cap and a password; a background purge removes
//! what has expired.

pub mod auth;
pub mod config;
pub mod datetime;
pub mod error;
pub mod file;
pub mod logging;
pub mod purge;
pub mod web;

pub use auth::{AccessGate, GateError};
pub use config::Config;
pub use error::{FiledropError, Result};
pub use file::{MetaRecord, MetadataStore, NewRecord, RecordPatch, UploadInfo, UploadOptions};
pub use purge::{PurgeEngine, PurgeHandle, PurgeReport};
pub use web::{AppState, Readiness, WebServer};
