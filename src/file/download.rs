//! Download preparation.
//!
//! Everything that has to happen before bytes go out: hidden paths are
//! refused, the content must exist, protected records need their password,
//! and every served file counts as one download.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use axum::http::HeaderMap;
use serde::Serialize;
use thiserror::Error;

use super::metadata::{MetaRecord, MetadataStore};
use super::storage::sanitize_filename;
use crate::auth::{authorize_download, GateError};
use crate::FiledropError;

/// Download failures.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The root itself or a dot-prefixed path.
    #[error("{0} cannot be downloaded")]
    Hidden(String),

    /// No content under that name.
    #[error("{0} not found")]
    NotFound(String),

    /// Fine gate refused the request.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Filesystem or metadata failure.
    #[error(transparent)]
    Storage(#[from] FiledropError),
}

/// Whether `path` may be served at all.
///
/// The root and any path with a dot-prefixed segment are refused, which keeps
/// the metadata and key directories out of reach.
pub fn is_valid_download_path(path: &str) -> bool {
    let trimmed = path.trim_matches('/');
    !trimmed.is_empty() && !trimmed.split('/').any(|segment| segment.starts_with('.'))
}

/// One visible entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    /// Entry name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

/// What a download request resolves to.
#[derive(Debug)]
pub enum Download {
    /// A directory, listed without dotfiles.
    Listing(Vec<ListingEntry>),
    /// A file ready to be served. The record already counts this download.
    File {
        /// Content location.
        path: PathBuf,
        /// Record after the increment.
        record: MetaRecord,
    },
}

/// Gatekeeper between download requests and the stored content.
#[derive(Debug, Clone)]
pub struct DownloadGateway {
    store: MetadataStore,
}

impl DownloadGateway {
    /// Create a gateway over a metadata store.
    pub fn new(store: MetadataStore) -> Self {
        Self { store }
    }

    /// Resolve a download request.
    ///
    /// `raw_path` is the path below the download route, `headers` and
    /// `query` carry the password for protected files. The download count
    /// is persisted before this returns.
    pub fn prepare(
        &self,
        raw_path: &str,
        headers: &HeaderMap,
        query: Option<&str>,
    ) -> Result<Download, DownloadError> {
        if !is_valid_download_path(raw_path) {
            tracing::warn!("Refusing to serve {:?}", raw_path);
            return Err(DownloadError::Hidden(raw_path.to_string()));
        }
        let filename = sanitize_filename(raw_path)?;
        let path = self.store.layout().content_path(&filename);

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DownloadError::NotFound(filename));
            }
            Err(e) => return Err(FiledropError::from_io(e, &filename).into()),
        };

        if metadata.is_dir() {
            return Ok(Download::Listing(list_directory(&path)?));
        }

        let mut record = self.store.find(&filename);
        authorize_download(&record, headers, query)?;
        self.store.increment_download_count(&mut record)?;

        tracing::info!(
            filename = %record.filename,
            downloads = record.download_count,
            "Serving file"
        );
        Ok(Download::File { path, record })
    }
}

/// List a directory, hiding dot-prefixed entries. Sorted by name.
pub fn list_directory(dir: &Path) -> Result<Vec<ListingEntry>, FiledropError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let metadata = entry.metadata()?;
        entries.push(ListingEntry {
            name,
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::metadata::NewRecord;
    use axum::http::HeaderValue;
    use tempfile::TempDir;

    fn setup() -> (TempDir, MetadataStore, DownloadGateway) {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::open(temp_dir.path(), temp_dir.path().join(".meta")).unwrap();
        let gateway = DownloadGateway::new(store.clone());
        (temp_dir, store, gateway)
    }

    fn put(store: &MetadataStore, new: NewRecord, content: &[u8]) {
        let path = store.layout().content_path(&new.filename);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        store.create(new).unwrap();
    }

    #[test]
    fn test_is_valid_download_path() {
        assert!(is_valid_download_path("report.pdf"));
        assert!(is_valid_download_path("team/report.pdf"));
        assert!(!is_valid_download_path(""));
        assert!(!is_valid_download_path("/"));
        assert!(!is_valid_download_path(".meta/report.pdf.json"));
        assert!(!is_valid_download_path("team/.hidden"));
        assert!(!is_valid_download_path("../etc/passwd"));
        assert!(!is_valid_download_path(".auth/key"));
    }

    #[test]
    fn test_prepare_counts_download() {
        let (_temp_dir, store, gateway) = setup();
        put(&store, NewRecord::new("a.txt", "text/plain", 3), b"abc");

        let download = gateway.prepare("a.txt", &HeaderMap::new(), None).unwrap();

        match download {
            Download::File { path, record } => {
                assert_eq!(path, store.layout().content_path("a.txt"));
                assert_eq!(record.download_count, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.find("a.txt").download_count, 1);
    }

    #[test]
    fn test_prepare_hidden_and_missing() {
        let (_temp_dir, _store, gateway) = setup();

        assert!(matches!(
            gateway.prepare(".meta/a.txt.json", &HeaderMap::new(), None),
            Err(DownloadError::Hidden(_))
        ));
        assert!(matches!(
            gateway.prepare("missing.txt", &HeaderMap::new(), None),
            Err(DownloadError::NotFound(_))
        ));
    }

    #[test]
    fn test_prepare_protected() {
        let (_temp_dir, store, gateway) = setup();
        put(
            &store,
            NewRecord::new("locked.txt", "text/plain", 1).with_password("pw"),
            b"x",
        );

        let mut wrong = HeaderMap::new();
        wrong.insert("x-key", HeaderValue::from_static("nope"));
        assert!(matches!(
            gateway.prepare("locked.txt", &wrong, None),
            Err(DownloadError::Gate(GateError::Unauthorized))
        ));
        assert_eq!(store.find("locked.txt").download_count, 0);

        assert!(gateway.prepare("locked.txt", &HeaderMap::new(), Some("key=pw")).is_ok());
        assert_eq!(store.find("locked.txt").download_count, 1);
    }

    #[test]
    fn test_prepare_directory_listing_hides_dotfiles() {
        let (temp_dir, store, gateway) = setup();
        put(&store, NewRecord::new("docs/b.txt", "", 2), b"bb");
        put(&store, NewRecord::new("docs/a.txt", "", 1), b"a");
        fs::write(temp_dir.path().join("docs/.secret"), b"s").unwrap();

        match gateway.prepare("docs", &HeaderMap::new(), None).unwrap() {
            Download::Listing(entries) => {
                let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, vec!["a.txt", "b.txt"]);
                assert_eq!(entries[1].size, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
