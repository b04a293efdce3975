//! API handlers.

pub mod files;

pub use files::*;

use std::time::Duration;

use url::Url;

use crate::auth::AccessGate;
use crate::config::Config;
use crate::file::{clear_staging, DownloadGateway, MetadataStore};
use crate::Result;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Metadata store.
    pub store: MetadataStore,
    /// Coarse gate for the management API.
    pub gate: AccessGate,
    /// Download preparation.
    pub downloads: DownloadGateway,
    /// Base of content URLs handed to clients.
    pub storage_url: Url,
    /// TTL applied when an upload carries no override.
    pub default_ttl: Option<Duration>,
    /// Upload size limit in bytes.
    pub max_upload_size: usize,
}

impl AppState {
    /// Create a new application state.
    pub fn new(store: MetadataStore, gate: AccessGate, storage_url: Url) -> Self {
        Self {
            downloads: DownloadGateway::new(store.clone()),
            store,
            gate,
            storage_url,
            default_ttl: None,
            max_upload_size: 5 * 1024 * 1024 * 1024,
        }
    }

    /// Build the state described by a configuration, creating the roots.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = MetadataStore::open(config.storage_root(), config.meta_root())?;
        std::fs::create_dir_all(config.auth_root())?;
        clear_staging(store.layout())?;

        Ok(Self::new(store, AccessGate::new(config.auth_root()), config.storage_url()?)
            .with_default_ttl(config.purge.default_ttl()?)
            .with_max_upload_size(config.max_upload_bytes()))
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the upload size limit.
    pub fn with_max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = bytes;
        self
    }
}
