//! File management module for filedrop.
//!
//! This module provides the metadata lifecycle of stored files:
//! - On-disk metadata records and their store
//! - Filesystem layout and filename sanitizing
//! - Streaming uploads and the upload response
//! - Download preparation (hidden paths, fine gate, download counting)
//! - Best-effort image previews

pub mod download;
pub mod expiry;
pub mod metadata;
pub mod storage;
pub mod thumbnail;
pub mod upload;

pub use download::{is_valid_download_path, Download, DownloadError, DownloadGateway, ListingEntry};
pub use expiry::Expiry;
pub use metadata::{MetaRecord, MetadataStore, NewRecord, RecordPatch};
pub use storage::{sanitize_filename, StorageLayout};
pub use thumbnail::Preview;
pub use upload::{clear_staging, write_content, StagedUpload, UploadInfo, UploadOptions};
