//! Conversion endpoints
//!
//! `POST /convert` starts a background job and returns its id;
//! `POST /convert-sync` waits and answers with the MIDI file.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use super::upload::receive_image;
use crate::error::{ApiError, ApiResult};
use crate::worker::spawn_conversion_job;
use crate::AppState;

pub const MIDI_CONTENT_TYPE: &str = "audio/midi";

#[derive(Debug, Serialize)]
pub struct ConvertStarted {
    pub task_id: Uuid,
    pub status: &'static str,
    pub message: String,
}

/// POST /convert
pub async fn start_conversion(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ConvertStarted>> {
    let job_id = Uuid::new_v4();
    let image = receive_image(&state.uploads, multipart, job_id).await?;

    state.jobs.create(job_id, image.path.clone()).await;
    info!(
        job_id = %job_id,
        source = %image.original_name,
        default_image = image.is_default,
        "Conversion started"
    );
    spawn_conversion_job(state, job_id, image.path);

    Ok(Json(ConvertStarted {
        task_id: job_id,
        status: "started",
        message: format!(
            "Conversion started. Use /status/{} to check progress.",
            job_id
        ),
    }))
}

/// POST /convert-sync
pub async fn convert_sync(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let job_id = Uuid::new_v4();
    let image = receive_image(&state.uploads, multipart, job_id).await?;

    info!(
        job_id = %job_id,
        source = %image.original_name,
        default_image = image.is_default,
        "Synchronous conversion"
    );
    let midi_path = match state.pipeline.convert(job_id, &image.path).await {
        Ok(path) => path,
        Err(e) => {
            state.record_error(e.to_string()).await;
            return Err(e.into());
        }
    };

    midi_attachment(&midi_path).await
}

/// MIDI file as an `audio/midi` download
pub async fn midi_attachment(path: &Path) -> ApiResult<Response> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ApiError::Internal(format!("Invalid MIDI path {}", path.display())))?;

    Ok((
        [
            (header::CONTENT_TYPE, MIDI_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Build conversion routes
pub fn convert_routes() -> Router<AppState> {
    Router::new()
        .route("/convert", post(start_conversion))
        .route("/convert-sync", post(convert_sync))
}
