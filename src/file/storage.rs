//! Filesystem layout for filedrop.
//!
//! A stored file is known by its logical filename, a relative path such as
//! `report.pdf` or `team/report.pdf`. Everything else is derived from it:
//!
//! ```text
//! {storage_root}/team/report.pdf                content
//! {storage_root}/team/report-thumbnail.png      preview (optional)
//! {meta_root}/team/report.pdf.json              metadata record
//! {storage_root}/.upload/<id>.part               upload in transfer
//! ```
//!
//! Filenames go through [`sanitize_filename`] before any join, which is what
//! keeps requests inside the configured roots.

use std::path::{Path, PathBuf};

use crate::{FiledropError, Result};

/// Extension appended to a filename to get its metadata record.
pub const METADATA_EXTENSION: &str = "json";

/// Suffix of the preview image generated next to image uploads.
pub const THUMBNAIL_SUFFIX: &str = "-thumbnail.png";

/// Directory below the storage root holding uploads still in transfer.
pub const STAGING_DIR: &str = ".upload";

/// Characters never allowed in a filename or key.
pub const FORBIDDEN_CHARS: &[char] = &['\\', ':', '<', '>', '|', '?', '*'];

/// Clean and validate a client-supplied filename.
///
/// `.` and empty segments are dropped. Absolute paths, `..`, dot-prefixed
/// segments, control characters and [`FORBIDDEN_CHARS`] are rejected. The
/// result uses `/` as separator and never starts or ends with one.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    if raw.starts_with('/') {
        return Err(invalid_filename(raw, "absolute path"));
    }
    if raw.chars().any(|c| c.is_control() || FORBIDDEN_CHARS.contains(&c)) {
        return Err(invalid_filename(raw, "forbidden character"));
    }

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid_filename(raw, "path traversal")),
            s if s.starts_with('.') => return Err(invalid_filename(raw, "hidden segment")),
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(invalid_filename(raw, "empty filename"));
    }
    Ok(segments.join("/"))
}

fn invalid_filename(raw: &str, reason: &str) -> FiledropError {
    FiledropError::Validation(format!("invalid filename {raw:?}: {reason}"))
}

/// Physical locations of content and metadata.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    storage_root: PathBuf,
    meta_root: PathBuf,
}

impl StorageLayout {
    /// Create a layout from the two roots. Nothing is touched on disk.
    pub fn new(storage_root: impl Into<PathBuf>, meta_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            meta_root: meta_root.into(),
        }
    }

    /// Root directory of uploaded content.
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Root directory of metadata records.
    pub fn meta_root(&self) -> &Path {
        &self.meta_root
    }

    /// Directory of uploads still in transfer.
    pub fn staging_root(&self) -> PathBuf {
        self.storage_root.join(STAGING_DIR)
    }

    /// Content path for a sanitized filename.
    pub fn content_path(&self, filename: &str) -> PathBuf {
        self.storage_root.join(filename)
    }

    /// Metadata record path for a sanitized filename.
    pub fn record_path(&self, filename: &str) -> PathBuf {
        self.meta_root
            .join(format!("{filename}.{METADATA_EXTENSION}"))
    }

    /// Preview path for a sanitized filename: the content basename without
    /// its extension plus [`THUMBNAIL_SUFFIX`], in the same directory.
    pub fn thumbnail_path(&self, filename: &str) -> PathBuf {
        let content = self.content_path(filename);
        let name = thumbnail_name(filename);
        match content.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Logical filename of a record file found under the metadata root.
    ///
    /// Returns `None` for paths outside the root or without the metadata
    /// extension.
    pub fn filename_from_record_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.meta_root).ok()?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?
            .join("/");
        let filename = relative.strip_suffix(&format!(".{METADATA_EXTENSION}"))?;
        (!filename.is_empty()).then(|| filename.to_string())
    }
}

/// Preview filename (relative to the content's directory) for a filename.
pub fn thumbnail_name(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(base);
    format!("{stem}{THUMBNAIL_SUFFIX}")
}

/// Preview filename relative to the storage root.
pub fn thumbnail_filename(filename: &str) -> String {
    match filename.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{}", thumbnail_name(filename)),
        None => thumbnail_name(filename),
    }
}
