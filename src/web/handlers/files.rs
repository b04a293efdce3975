//! File handlers for the HTTP API.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{multipart::MultipartError, Multipart, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures::StreamExt;
use mime_guess::mime::Mime;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::file::upload::FILE_FIELD;
use crate::file::{
    sanitize_filename, Download, NewRecord, Preview, RecordPatch, StagedUpload, UploadInfo,
    UploadOptions,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::FiledropError;

fn multipart_error(e: MultipartError) -> ApiError {
    tracing::error!("Failed to read multipart field: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Upload exceeds the size limit")
    } else {
        ApiError::bad_request("Invalid multipart data")
    }
}

fn transfer_error(e: MultipartError) -> FiledropError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        FiledropError::TooLarge("upload exceeds the size limit".to_string())
    } else {
        FiledropError::Validation(format!("upload interrupted: {e}"))
    }
}

/// POST /api/v1/files - Upload a file.
///
/// Request body: multipart/form-data with a `file` part plus optional
/// `password` and expiry fields, in any order. The content stays staged
/// until the whole form is read; any error before that discards it.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadInfo>, ApiError> {
    let mut uploaded: Option<(String, String, StagedUpload)> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        if name != FILE_FIELD {
            let value = field.text().await.map_err(multipart_error)?;
            fields.entry(name).or_insert(value);
            continue;
        }

        if uploaded.is_some() {
            return Err(ApiError::bad_request("Only one file per upload"));
        }

        let raw_name = field.file_name().unwrap_or("").to_string();
        let filename = sanitize_filename(&raw_name)?;
        let mime_type = field
            .content_type()
            .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_raw()
                    .unwrap_or("application/octet-stream")
                    .to_string()
            });

        tracing::info!(%filename, "Receiving a file in {}", state.store.layout().storage_root().display());
        let chunks = field.map(|chunk| chunk.map_err(transfer_error));
        let staged = StagedUpload::receive(state.store.layout(), chunks)
            .await
            .map_err(|e| {
                tracing::error!(%filename, "Failed to receive file: {}", e);
                ApiError::from(e)
            })?;

        uploaded = Some((filename, mime_type, staged));
    }

    let (filename, mime_type, staged) =
        uploaded.ok_or_else(|| ApiError::bad_request("Missing form field \"file\""))?;
    let size = staged.size();

    staged
        .commit(&state.store.layout().content_path(&filename))
        .await
        .map_err(|e| {
            tracing::error!(%filename, "Failed to store file: {}", e);
            ApiError::from(e)
        })?;
    tracing::info!(%filename, "Written {} bytes", size);

    let options = UploadOptions::from_fields(|key| fields.get(key).cloned());
    let ttl = options.effective_ttl(Utc::now(), state.default_ttl);

    let mut new_record = NewRecord::new(&filename, mime_type, size).with_ttl(ttl);
    if let Some(password) = &options.password {
        new_record = new_record.with_password(password);
    }

    let record = state.store.create(new_record).map_err(|e| {
        tracing::error!(%filename, "Failed to build metadata: {}", e);
        ApiError::internal("Failed to create file metadata")
    })?;

    let preview = {
        let layout = state.store.layout().clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || Preview::for_record(&layout, &record))
            .await
            .map_err(|e| {
                tracing::error!("Preview task failed: {}", e);
                ApiError::internal("Failed to build upload info")
            })?
    };

    let info = UploadInfo::from_record(&record, &state.storage_url, &preview, options.password)
        .map_err(|e| {
            tracing::error!(%filename, "Failed to build upload info: {}", e);
            ApiError::internal("Failed to build upload info")
        })?;

    Ok(Json(info))
}

/// PATCH /api/v1/files/*filename - Update the metadata of a file.
pub async fn update_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let filename = sanitize_filename(&filename)?;
    let mut record = state.store.find(&filename);
    tracing::info!(%filename, record = ?record.redacted(), "Loaded metadata");

    let patch = RecordPatch::from_json(&body, Utc::now()).map_err(|e| {
        tracing::error!(%filename, "Failed to parse the request body: {}", e);
        ApiError::bad_request("Invalid update body")
    })?;

    state.store.update(&mut record, patch).map_err(|e| {
        tracing::error!(%filename, "Failed to update metadata: {}", e);
        ApiError::internal(format!("Failed to update {filename}"))
    })?;

    tracing::info!(%filename, "File was updated successfully");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/files/*filename - Delete a file and its metadata.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<StatusCode, ApiError> {
    let filename = sanitize_filename(&filename)?;
    let record = state.store.find(&filename);

    if let Err(e) = state.store.delete_content(&record) {
        tracing::error!(%filename, "Failed to delete content: {}", e);
        return Err(e.into());
    }

    if let Err(e) = state.store.delete(&record) {
        tracing::error!(%filename, "Failed to delete metadata: {}", e);
    }

    tracing::info!(%filename, "File was deleted successfully");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/files/*path - Download a file or list a directory.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let download = state
        .downloads
        .prepare(&path, request.headers(), request.uri().query())?;

    match download {
        Download::Listing(entries) => Ok(Json(entries).into_response()),
        Download::File { path, record } => {
            let service = match record.mime_type.parse::<Mime>() {
                Ok(mime) => ServeFile::new_with_mime(&path, &mime),
                Err(_) => ServeFile::new(&path),
            };
            let response = service.oneshot(request).await.map_err(|e| {
                tracing::error!("Failed to serve {}: {}", path.display(), e);
                ApiError::internal("Failed to read file")
            })?;
            Ok(response.map(Body::new))
        }
    }
}
