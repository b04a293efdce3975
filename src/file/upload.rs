//! Upload handling: per-request options, streaming writes and the response.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use super::expiry::Expiry;
use super::metadata::MetaRecord;
use super::storage::StorageLayout;
use super::thumbnail::Preview;
use crate::{FiledropError, Result};

/// Form field carrying the file content.
pub const FILE_FIELD: &str = "file";

/// Form field carrying an optional download password.
pub const PASSWORD_FIELD: &str = "password";

/// Options sent along with an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Expiry override.
    pub expiry: Option<Expiry>,
    /// Download password.
    pub password: Option<String>,
}

impl UploadOptions {
    /// Normalize the form fields of an upload.
    pub fn from_fields<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            password: lookup(PASSWORD_FIELD).filter(|p| !p.is_empty()),
            expiry: Expiry::from_fields(lookup),
        }
    }

    /// TTL applied to the new record.
    ///
    /// The override wins when it yields a positive TTL; otherwise the process
    /// default applies.
    pub fn effective_ttl(&self, now: DateTime<Utc>, default: Option<Duration>) -> Option<Duration> {
        match self.expiry.and_then(|e| e.ttl(now)) {
            Some(ttl) => Some(ttl),
            None => {
                if let Some(Expiry::At(at)) = self.expiry {
                    tracing::warn!("Ignoring expiry override in the past: {}", at);
                }
                default.filter(|d| !d.is_zero())
            }
        }
    }
}

/// Stream chunks to `destination`, creating parent directories.
///
/// Returns the number of bytes written. A failed transfer removes the
/// partial file and returns the stream's own error.
pub async fn write_content<S, B, E>(destination: &Path, chunks: S) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<FiledropError>,
{
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(destination).await?;
    let mut chunks = std::pin::pin!(chunks);

    let mut written: u64 = 0;
    let outcome: Result<()> = async {
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(Into::into)?;
            file.write_all(chunk.as_ref()).await?;
            written += chunk.as_ref().len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(e) = outcome {
        drop(file);
        if let Err(remove_err) = fs::remove_file(destination).await {
            tracing::warn!("Failed to remove partial upload {}: {}", destination.display(), remove_err);
        }
        return Err(e);
    }

    tracing::info!("Written {} bytes to {}", written, destination.display());
    Ok(written)
}

static NEXT_STAGING_ID: AtomicU64 = AtomicU64::new(0);

/// Content received into the staging directory, not yet visible.
///
/// [`commit`](Self::commit) moves it to its final path, replacing any
/// previous content in one step. Dropping an uncommitted upload removes the
/// staging file, so an upload rejected after the transfer leaves nothing.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    size: u64,
    committed: bool,
}

impl StagedUpload {
    /// Stream `chunks` into a fresh staging file below `layout`.
    pub async fn receive<S, B, E>(layout: &StorageLayout, chunks: S) -> Result<Self>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<FiledropError>,
    {
        let id = NEXT_STAGING_ID.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let path = layout
            .staging_root()
            .join(format!("{}-{}-{}.part", std::process::id(), nanos, id));

        let size = write_content(&path, chunks).await?;
        Ok(Self {
            path,
            size,
            committed: false,
        })
    }

    /// Bytes received.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Staging file holding the content.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the content to `destination`, creating parent directories.
    pub async fn commit(mut self, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&self.path, destination).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove staged upload {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Remove uploads left in the staging directory by an earlier run.
pub fn clear_staging(layout: &StorageLayout) -> Result<()> {
    let staging = layout.staging_root();
    match std::fs::remove_dir_all(&staging) {
        Ok(()) => {
            tracing::info!("Removed stale uploads in {}", staging.display());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::create_dir_all(&staging)?;
    Ok(())
}

/// Public URL of a file below the storage URL. Each segment is percent-encoded.
pub fn content_url(storage_url: &Url, filename: &str) -> Result<Url> {
    let encoded = filename
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    storage_url
        .join(&encoded)
        .map_err(|e| FiledropError::Validation(format!("cannot build url for {filename:?}: {e}")))
}

/// Response returned to the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    /// MIME type recorded for the content.
    pub mime_type: String,
    /// Bytes stored.
    pub size: u64,
    /// Where the content can be downloaded.
    pub content_url: String,
    /// Preview image or placeholder icon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// When the file will be purged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_at: Option<DateTime<Utc>>,
    /// Password echoed back to the uploader.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UploadInfo {
    /// Build the response for a freshly created record.
    pub fn from_record(
        record: &MetaRecord,
        storage_url: &Url,
        preview: &Preview,
        password: Option<String>,
    ) -> Result<Self> {
        let thumbnail_url = match preview {
            Preview::Generated(name) => content_url(storage_url, name)?.to_string(),
            Preview::Icon(icon) => (*icon).to_string(),
        };

        Ok(Self {
            mime_type: record.mime_type.clone(),
            size: record.size,
            content_url: content_url(storage_url, &record.filename)?.to_string(),
            thumbnail_url: Some(thumbnail_url),
            delete_at: record.delete_at,
            password,
        })
    }
}
