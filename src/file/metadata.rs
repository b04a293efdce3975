//! Metadata records and their on-disk store.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::expiry::Expiry;
use super::storage::StorageLayout;
use crate::auth::password::{ensure_hashed, is_hashed, verify_password};
use crate::datetime::{add_duration, parse_duration, parse_time};
use crate::{FiledropError, Result};

/// Metadata describing one stored file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "StoredRecord")]
pub struct MetaRecord {
    /// Sanitized filename, relative to the storage root.
    pub filename: String,
    /// When the file was uploaded.
    pub created_at: DateTime<Utc>,
    /// When the file must be purged; `None` means never.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_at: Option<DateTime<Utc>>,
    /// MIME type reported at upload.
    pub mime_type: String,
    /// Bytes written at upload.
    pub size: u64,
    /// Download cap; 0 means unlimited.
    pub max_downloads: u64,
    /// Number of served downloads.
    pub download_count: u64,
    /// Password protecting downloads, hashed once saved.
    #[serde(rename = "password", skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
}

/// Record keys holding the deletion time, in priority order.
const RECORD_TIME_KEYS: &[&str] = &["deleteAt", "purgeAt", "purgeOn"];

/// Record keys holding a time-to-live, used when no deletion time is stored.
const RECORD_DURATION_KEYS: &[&str] = &["deleteIn", "deleteAfter", "purgeIn", "purgeAfter"];

/// A record as found on disk, expiry keys still raw.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    created_at: DateTime<Utc>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    max_downloads: u64,
    #[serde(default)]
    download_count: u64,
    #[serde(default, rename = "password")]
    password_hash: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl StoredRecord {
    /// Value of the first key present; `null` and non-string values count as unset.
    fn first_present<'a>(&'a self, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .find_map(|key| self.extra.get(*key))
            .and_then(Value::as_str)
    }

    fn delete_at(&self) -> Result<Option<DateTime<Utc>>> {
        if let Some(value) = self.first_present(RECORD_TIME_KEYS) {
            return parse_time(value).map(Some);
        }
        match self.first_present(RECORD_DURATION_KEYS) {
            Some(value) => {
                let ttl = parse_duration(value)?;
                let base = if self.created_at == DateTime::<Utc>::default() {
                    Utc::now()
                } else {
                    self.created_at
                };
                add_duration(base, ttl).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl TryFrom<StoredRecord> for MetaRecord {
    type Error = FiledropError;

    fn try_from(stored: StoredRecord) -> Result<Self> {
        let delete_at = stored.delete_at()?;
        Ok(Self {
            filename: stored.filename,
            created_at: stored.created_at,
            delete_at,
            mime_type: stored.mime_type,
            size: stored.size,
            max_downloads: stored.max_downloads,
            download_count: stored.download_count,
            password_hash: stored.password_hash,
        })
    }
}

impl MetaRecord {
    /// A zero-value record: nothing protected, nothing expires.
    pub fn empty(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Whether downloads require a password.
    pub fn is_protected(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Whether the record is due for purging at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.delete_at.is_some_and(|at| now >= at)
    }

    /// Check a candidate password. Unprotected records accept anything.
    pub fn authenticate(&self, candidate: &str) -> bool {
        match self.password_hash.as_deref() {
            Some(hash) if !hash.is_empty() => verify_password(candidate, hash),
            _ => true,
        }
    }

    /// Copy with the password hash masked, for logging.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.password_hash.is_some() {
            copy.password_hash = Some("<redacted>".to_string());
        }
        copy
    }
}

/// Data for creating a new record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Sanitized filename.
    pub filename: String,
    /// MIME type of the content.
    pub mime_type: String,
    /// Bytes actually written.
    pub size: u64,
    /// Effective time-to-live; `None` means never expires.
    pub ttl: Option<Duration>,
    /// Plaintext password, hashed on save.
    pub password: Option<String>,
    /// Download cap; 0 means unlimited.
    pub max_downloads: u64,
}

impl NewRecord {
    /// Create a new NewRecord.
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            size,
            ttl: None,
            password: None,
            max_downloads: 0,
        }
    }

    /// Set the time-to-live. A zero duration means never expires.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl.filter(|t| !t.is_zero());
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    /// Set the download cap.
    pub fn with_max_downloads(mut self, max_downloads: u64) -> Self {
        self.max_downloads = max_downloads;
        self
    }
}

/// Partial update of a record.
///
/// Only non-empty, non-zero fields are applied; everything else leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    /// New MIME type.
    pub mime_type: Option<String>,
    /// New password (plaintext or already hashed).
    pub password: Option<String>,
    /// New deletion time.
    pub delete_at: Option<DateTime<Utc>>,
    /// New download cap.
    pub max_downloads: Option<u64>,
}

impl RecordPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MIME type.
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the deletion time.
    pub fn delete_at(mut self, delete_at: DateTime<Utc>) -> Self {
        self.delete_at = Some(delete_at);
        self
    }

    /// Set the download cap.
    pub fn max_downloads(mut self, max_downloads: u64) -> Self {
        self.max_downloads = Some(max_downloads);
        self
    }

    /// Build a patch from a JSON update body.
    ///
    /// The deletion time may be given under any of the expiry aliases, as an
    /// absolute time or as a duration counted from `now`. A time in the past
    /// is kept: it expires the file on the next purge.
    pub fn from_json(body: &[u8], now: DateTime<Utc>) -> Result<Self> {
        let fields: Map<String, Value> = serde_json::from_slice(body)?;

        let string_field = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

        let max_downloads = match fields.get("maxDownloads") {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_u64().ok_or_else(|| {
                FiledropError::Validation("maxDownloads must be a non-negative integer".into())
            })?),
        };

        Ok(Self {
            mime_type: string_field("mimeType"),
            password: string_field("password"),
            delete_at: Expiry::from_fields(string_field).and_then(|e| e.deadline(now)),
            max_downloads,
        })
    }

    /// Whether applying this patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.mime_type.as_deref().map_or(true, str::is_empty)
            && self.password.as_deref().map_or(true, str::is_empty)
            && self.delete_at.is_none()
            && self.max_downloads.map_or(true, |m| m == 0)
    }
}

/// Store mapping filenames to their persisted metadata records.
///
/// Records are JSON documents; the store is the only component that reads
/// or writes them. There is no locking: concurrent writers to the same
/// record race and the last write wins.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    layout: StorageLayout,
}

impl MetadataStore {
    /// Create a store over an existing layout.
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Create a store, making sure both roots exist.
    pub fn open(storage_root: impl AsRef<Path>, meta_root: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(storage_root.as_ref())?;
        fs::create_dir_all(meta_root.as_ref())?;
        Ok(Self::new(StorageLayout::new(
            storage_root.as_ref(),
            meta_root.as_ref(),
        )))
    }

    /// Filesystem layout used by this store.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Create and persist the record for freshly written content.
    pub fn create(&self, new: NewRecord) -> Result<MetaRecord> {
        let created_at = Utc::now();
        let delete_at = match new.ttl {
            Some(ttl) => Some(add_duration(created_at, ttl)?),
            None => None,
        };

        let mut record = MetaRecord {
            filename: new.filename,
            created_at,
            delete_at,
            mime_type: new.mime_type,
            size: new.size,
            max_downloads: new.max_downloads,
            download_count: 0,
            password_hash: new.password,
        };
        self.save(&mut record)?;

        tracing::info!(
            filename = %record.filename,
            size = record.size,
            delete_at = ?record.delete_at,
            "Created metadata"
        );
        Ok(record)
    }

    /// Load the record for `filename`.
    ///
    /// A missing or unreadable record yields [`MetaRecord::empty`]: callers
    /// treat "no record" as "defaults apply".
    pub fn find(&self, filename: &str) -> MetaRecord {
        let path = self.layout.record_path(filename);

        let payload = match fs::read(&path) {
            Ok(payload) => payload,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::error!(filename, "Failed to read metadata: {}", e);
                }
                return MetaRecord::empty(filename);
            }
        };

        match serde_json::from_slice::<MetaRecord>(&payload) {
            Ok(mut record) => {
                record.filename = filename.to_string();
                tracing::debug!(filename, record = ?record.redacted(), "Found metadata");
                record
            }
            Err(e) => {
                tracing::error!(filename, "Failed to decode metadata: {}", e);
                MetaRecord::empty(filename)
            }
        }
    }

    /// Persist a record, hashing a plaintext password in place first.
    pub fn save(&self, record: &mut MetaRecord) -> Result<()> {
        if let Some(password) = record.password_hash.as_deref() {
            if password.is_empty() {
                record.password_hash = None;
            } else if !is_hashed(password) {
                record.password_hash = Some(ensure_hashed(password));
            }
        }

        let payload = serde_json::to_vec(record)?;
        let path = self.layout.record_path(&record.filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_private(&path, &payload)
    }

    /// Merge the non-empty fields of `patch` into `record`, then save.
    pub fn update(&self, record: &mut MetaRecord, patch: RecordPatch) -> Result<()> {
        let filename = record.filename.clone();

        if let Some(mime_type) = patch.mime_type.filter(|m| !m.is_empty()) {
            if mime_type != record.mime_type {
                tracing::info!(%filename, "Updating MimeType from {:?} to {:?}", record.mime_type, mime_type);
                record.mime_type = mime_type;
            }
        }
        if let Some(password) = patch.password.filter(|p| !p.is_empty()) {
            tracing::info!(%filename, "Updating Password");
            record.password_hash = Some(password);
        }
        if let Some(delete_at) = patch.delete_at {
            if record.delete_at != Some(delete_at) {
                tracing::info!(%filename, "Updating DeleteAt from {:?} to {}", record.delete_at, delete_at);
                record.delete_at = Some(delete_at);
            }
        }
        if let Some(max_downloads) = patch.max_downloads.filter(|m| *m > 0) {
            if max_downloads != record.max_downloads {
                tracing::info!(%filename, "Updating MaxDownloads from {} to {}", record.max_downloads, max_downloads);
                record.max_downloads = max_downloads;
            }
        }

        self.save(record)
    }

    /// Count one download and persist.
    ///
    /// Reaching a non-zero download cap sets the deletion time to now.
    pub fn increment_download_count(&self, record: &mut MetaRecord) -> Result<()> {
        record.download_count = record.download_count.saturating_add(1);
        if record.max_downloads > 0 && record.download_count >= record.max_downloads {
            tracing::info!(
                filename = %record.filename,
                "Download count reached the limit ({})",
                record.max_downloads
            );
            record.delete_at = Some(Utc::now());
        }
        self.save(record)
    }

    /// Remove the record file. An already absent record is not an error.
    pub fn delete(&self, record: &MetaRecord) -> Result<()> {
        match fs::remove_file(self.layout.record_path(&record.filename)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FiledropError::from_io(e, &record.filename)),
        }
    }

    /// Remove the content and its preview, if any.
    ///
    /// Missing content is an error; a missing preview is not.
    pub fn delete_content(&self, record: &MetaRecord) -> Result<()> {
        fs::remove_file(self.layout.content_path(&record.filename))
            .map_err(|e| FiledropError::from_io(e, &record.filename))?;

        match fs::remove_file(self.layout.thumbnail_path(&record.filename)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FiledropError::from_io(e, &record.filename)),
        }
    }
}

#[cfg(unix)]
fn write_private(path: &Path, payload: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(payload)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, payload: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(payload)?;
    Ok(())
}
