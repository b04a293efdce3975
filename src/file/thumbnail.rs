//! Image previews for uploads.
//!
//! Previews are best effort: when an image cannot be decoded (or preview
//! support is compiled out) the upload still succeeds with a placeholder
//! icon.

use std::path::Path;

use super::metadata::MetaRecord;
use super::storage::{thumbnail_filename, StorageLayout};
#[cfg(not(feature = "thumbnails"))]
use crate::FiledropError;
use crate::Result;

/// Edge length of generated previews, in pixels.
pub const THUMBNAIL_SIZE: u32 = 128;

/// Placeholder for images whose preview failed.
pub const IMAGE_ICON: &str =
    "https://cdn2.iconfinder.com/data/icons/freecns-cumulus/16/519587-084_Photo-64.png";

/// Placeholder for audio content.
pub const AUDIO_ICON: &str =
    "https://cdn1.iconfinder.com/data/icons/ios-11-glyphs/30/circled_play-64.png";

/// Placeholder for video content.
pub const VIDEO_ICON: &str =
    "https://cdn2.iconfinder.com/data/icons/flat-ui-icons-24-px/24/video-24-64.png";

/// Placeholder for everything else.
pub const DEFAULT_ICON: &str =
    "https://cdn1.iconfinder.com/data/icons/material-core/19/file-download-64.png";

/// What the upload response points to as a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// A generated preview, relative to the storage root.
    Generated(String),
    /// A fixed placeholder URL.
    Icon(&'static str),
}

impl Preview {
    /// Pick or generate the preview for a stored file.
    ///
    /// Blocking: decodes and encodes images on the calling thread.
    pub fn for_record(layout: &StorageLayout, record: &MetaRecord) -> Self {
        let mime = record.mime_type.as_str();
        if mime.starts_with("image") {
            let source = layout.content_path(&record.filename);
            let target = layout.thumbnail_path(&record.filename);
            match generate(&source, &target) {
                Ok(()) => Preview::Generated(thumbnail_filename(&record.filename)),
                Err(e) => {
                    tracing::warn!(
                        filename = %record.filename,
                        "Failed to create a thumbnail, using a default icon: {}",
                        e
                    );
                    Preview::Icon(IMAGE_ICON)
                }
            }
        } else if mime.starts_with("audio") {
            Preview::Icon(AUDIO_ICON)
        } else if mime.starts_with("video") {
            Preview::Icon(VIDEO_ICON)
        } else {
            Preview::Icon(DEFAULT_ICON)
        }
    }
}

/// Write a PNG preview of `source`, at most [`THUMBNAIL_SIZE`] on each side.
#[cfg(feature = "thumbnails")]
pub fn generate(source: &Path, target: &Path) -> Result<()> {
    use crate::FiledropError;

    let original = image::open(source)
        .map_err(|e| FiledropError::Validation(format!("cannot decode image: {e}")))?;
    original
        .thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
        .save_with_format(target, image::ImageFormat::Png)
        .map_err(|e| FiledropError::Validation(format!("cannot write thumbnail: {e}")))?;
    Ok(())
}

/// Write a PNG preview of `source`, at most [`THUMBNAIL_SIZE`] on each side.
#[cfg(not(feature = "thumbnails"))]
pub fn generate(_source: &Path, _target: &Path) -> Result<()> {
    Err(FiledropError::Validation(
        "thumbnail support is not enabled".to_string(),
    ))
}
