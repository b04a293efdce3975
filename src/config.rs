//! Configuration module for filedrop.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::datetime::parse_duration;
use crate::{FiledropError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long shutdown waits for in-flight connections, in seconds.
    #[serde(default = "default_graceful_timeout")]
    pub graceful_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_graceful_timeout() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            graceful_timeout_secs: default_graceful_timeout(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the uploaded content.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Directory holding metadata records (defaults to `<root>/.meta`).
    #[serde(default)]
    pub meta_root: Option<String>,
    /// Directory holding API keys (defaults to `<root>/.auth`).
    #[serde(default)]
    pub auth_root: Option<String>,
    /// Public URL clients use to reach the storage (defaults to the server address).
    #[serde(default)]
    pub url: String,
    /// Append `api/v1/files/` to the storage URL.
    #[serde(default = "default_append_api_path")]
    pub append_api_path: bool,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_storage_root() -> String {
    "data/storage".to_string()
}

fn default_append_api_path() -> bool {
    true
}

fn default_max_upload_size() -> u64 {
    5 * 1024 // 5GB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            meta_root: None,
            auth_root: None,
            url: String::new(),
            append_api_path: default_append_api_path(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

/// Purge job configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PurgeConfig {
    /// How often the purge sweep runs (duration string).
    #[serde(default = "default_purge_frequency")]
    pub frequency: String,
    /// Default time-to-live of uploads; "0s" means never.
    #[serde(default = "default_purge_after")]
    pub after: String,
}

fn default_purge_frequency() -> String {
    "1m".to_string()
}

fn default_purge_after() -> String {
    "0s".to_string()
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            frequency: default_purge_frequency(),
            after: default_purge_after(),
        }
    }
}

impl PurgeConfig {
    /// Sweep interval.
    pub fn frequency(&self) -> Result<Duration> {
        parse_duration(&self.frequency)
            .map_err(|e| FiledropError::Config(format!("purge.frequency: {e}")))
    }

    /// Default TTL; `None` when uploads never expire by default.
    pub fn default_ttl(&self) -> Result<Option<Duration>> {
        let ttl = parse_duration(&self.after)
            .map_err(|e| FiledropError::Config(format!("purge.after: {e}")))?;
        Ok((!ttl.is_zero()).then_some(ttl))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/filedrop.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Web API configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebConfig {
    /// CORS allowed origins (empty allows any origin).
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Purge configuration.
    #[serde(default)]
    pub purge: PurgeConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Web API configuration.
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FiledropError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FiledropError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEDROP_PORT`
    /// - `FILEDROP_STORAGE_ROOT`
    /// - `FILEDROP_STORAGE_URL`
    /// - `FILEDROP_PURGE_AFTER`
    /// - `FILEDROP_PURGE_FREQUENCY`
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_value("FILEDROP_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid FILEDROP_PORT: {}", port),
            }
        }
        if let Some(root) = env_value("FILEDROP_STORAGE_ROOT") {
            self.storage.root = root;
        }
        if let Some(url) = env_value("FILEDROP_STORAGE_URL") {
            self.storage.url = url;
        }
        if let Some(after) = env_value("FILEDROP_PURGE_AFTER") {
            self.purge.after = after;
        }
        if let Some(frequency) = env_value("FILEDROP_PURGE_FREQUENCY") {
            self.purge.frequency = frequency;
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - a purge duration does not parse
    /// - the purge frequency is zero
    /// - the storage URL is set but not a valid absolute URL
    pub fn validate(&self) -> Result<()> {
        if self.purge.frequency()?.is_zero() {
            return Err(FiledropError::Config(
                "purge.frequency must be greater than zero".to_string(),
            ));
        }
        self.purge.default_ttl()?;
        self.storage_url()?;
        Ok(())
    }

    /// Content storage directory.
    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.root)
    }

    /// Metadata directory.
    pub fn meta_root(&self) -> PathBuf {
        match &self.storage.meta_root {
            Some(path) => PathBuf::from(path),
            None => self.storage_root().join(".meta"),
        }
    }

    /// API key directory.
    pub fn auth_root(&self) -> PathBuf {
        match &self.storage.auth_root {
            Some(path) => PathBuf::from(path),
            None => self.storage_root().join(".auth"),
        }
    }

    /// Base URL content URLs are built from. Always ends with a slash.
    pub fn storage_url(&self) -> Result<Url> {
        let base = if self.storage.url.is_empty() {
            format!("http://{}:{}/", self.server.host, self.server.port)
        } else {
            self.storage.url.clone()
        };

        let mut url = Url::parse(&base)
            .map_err(|e| FiledropError::Config(format!("invalid storage url {base:?}: {e}")))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        if self.storage.append_api_path {
            url = url
                .join("api/v1/files/")
                .map_err(|e| FiledropError::Config(format!("invalid storage url: {e}")))?;
        }
        Ok(url)
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.storage.max_upload_size_mb.saturating_mul(1024 * 1024))
            .unwrap_or(usize::MAX)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.graceful_timeout_secs, 15);

        assert_eq!(config.storage.root, "data/storage");
        assert!(config.storage.meta_root.is_none());
        assert!(config.storage.auth_root.is_none());
        assert!(config.storage.append_api_path);
        assert_eq!(config.storage.max_upload_size_mb, 5 * 1024);

        assert_eq!(config.purge.frequency().unwrap(), Duration::from_secs(60));
        assert_eq!(config.purge.default_ttl().unwrap(), None);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/filedrop.log");

        assert!(config.web.cors_origins.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
graceful_timeout_secs = 30

[storage]
root = "/srv/drop"
meta_root = "/srv/meta"
auth_root = "/srv/keys"
url = "https://drop.example.com/"
append_api_path = false
max_upload_size_mb = 20

[purge]
frequency = "30s"
after = "2h"

[logging]
level = "debug"
file = "custom/app.log"

[web]
cors_origins = ["https://app.example.com"]
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.graceful_timeout_secs, 30);
        assert_eq!(config.storage_root(), PathBuf::from("/srv/drop"));
        assert_eq!(config.meta_root(), PathBuf::from("/srv/meta"));
        assert_eq!(config.auth_root(), PathBuf::from("/srv/keys"));
        assert_eq!(config.max_upload_bytes(), 20 * 1024 * 1024);
        assert_eq!(config.purge.frequency().unwrap(), Duration::from_secs(30));
        assert_eq!(
            config.purge.default_ttl().unwrap(),
            Some(Duration::from_secs(7200))
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.web.cors_origins.len(), 1);
        assert_eq!(
            config.storage_url().unwrap().as_str(),
            "https://drop.example.com/"
        );
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.meta_root(), PathBuf::from("data/storage/.meta"));
        assert_eq!(config.auth_root(), PathBuf::from("data/storage/.auth"));
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");
        assert!(matches!(result, Err(FiledropError::Config(msg)) if msg.contains("config parse error")));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(FiledropError::Io(_))));
    }

    #[test]
    fn test_storage_url_defaults_to_server_address() {
        let mut config = Config::default();
        config.server.host = "localhost".to_string();
        config.server.port = 3000;

        let url = config.storage_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/v1/files/");
    }

    #[test]
    fn test_storage_url_appends_missing_slash() {
        let mut config = Config::default();
        config.storage.url = "https://cdn.example.com/drop".to_string();

        let url = config.storage_url().unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/drop/api/v1/files/");
    }

    #[test]
    fn test_validate_rejects_bad_durations() {
        let mut config = Config::default();
        config.purge.after = "forever".to_string();
        assert!(matches!(config.validate(), Err(FiledropError::Config(_))));

        let mut config = Config::default();
        config.purge.frequency = "0s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.storage.url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_apply_env_overrides_purge_after() {
        let original = std::env::var("FILEDROP_PURGE_AFTER").ok();

        std::env::set_var("FILEDROP_PURGE_AFTER", "45m");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.purge.after, "45m");

        std::env::set_var("FILEDROP_PURGE_AFTER", "");
        let mut config = Config::default();
        config.purge.after = "1h".to_string();
        config.apply_env_overrides();
        assert_eq!(config.purge.after, "1h");

        if let Some(val) = original {
            std::env::set_var("FILEDROP_PURGE_AFTER", val);
        } else {
            std::env::remove_var("FILEDROP_PURGE_AFTER");
        }
    }
}
