//! Image upload handling shared by the convert endpoints

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::http::StatusCode;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::UploadSettings;

/// Multipart field names accepted for the image
const FILE_FIELDS: [&str; 2] = ["file", "image"];

/// Formats the OMR engines can read
const ACCEPTED_MIME_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/tiff", "application/pdf"];

/// An image on disk, ready for conversion
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub path: PathBuf,
    /// Client-supplied file name, or the default image's name
    pub original_name: String,
    /// True when no file was sent and the default test image is used
    pub is_default: bool,
}

/// Store the uploaded image for `job_id`, or fall back to the default test image
pub async fn receive_image(
    uploads: &UploadSettings,
    multipart: Result<Multipart, MultipartRejection>,
    job_id: Uuid,
) -> ApiResult<UploadedImage> {
    let upload = match multipart {
        Ok(multipart) => read_file_field(multipart, uploads.max_upload_bytes).await?,
        Err(rejection) => {
            debug!(reason = %rejection, "Request is not multipart");
            None
        }
    };

    match upload {
        Some((file_name, bytes)) => store_upload(uploads, job_id, &file_name, &bytes).await,
        None => default_image(&uploads.default_test_image).await,
    }
}

/// First non-empty `file`/`image` field as (file name, bytes)
async fn read_file_field(
    mut multipart: Multipart,
    limit: usize,
) -> ApiResult<Option<(String, Vec<u8>)>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if !field.name().is_some_and(|name| FILE_FIELDS.contains(&name)) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            // browsers send an empty part for an unset file input
            continue;
        }
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        return Ok(Some((file_name, bytes.to_vec())));
    }
    Ok(None)
}

fn multipart_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(format!("Upload exceeds the {} byte limit", limit))
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

async fn store_upload(
    uploads: &UploadSettings,
    job_id: Uuid,
    file_name: &str,
    bytes: &[u8],
) -> ApiResult<UploadedImage> {
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    let mime = infer::get(bytes).map(|kind| kind.mime_type());
    if !mime.is_some_and(|m| ACCEPTED_MIME_TYPES.contains(&m)) {
        return Err(ApiError::BadRequest("Unsupported file type".to_string()));
    }

    tokio::fs::create_dir_all(&uploads.uploads_dir).await?;
    let path = uploads
        .uploads_dir
        .join(format!("{}_{}", job_id, sanitize_filename(file_name)));

    let mut file = tokio::fs::File::create(&path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;

    info!(
        job_id = %job_id,
        path = %path.display(),
        bytes = bytes.len(),
        mime = mime.unwrap_or_default(),
        "Stored upload"
    );

    Ok(UploadedImage {
        path,
        original_name: file_name.to_string(),
        is_default: false,
    })
}

async fn default_image(path: &Path) -> ApiResult<UploadedImage> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ApiError::BadRequest(
            "No file uploaded and test image not found".to_string(),
        ));
    }

    info!(path = %path.display(), "No file uploaded, using default test image");
    Ok(UploadedImage {
        path: path.to_path_buf(),
        original_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        is_default: true,
    })
}

/// Final path component with only `[A-Za-z0-9._-]` kept
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
