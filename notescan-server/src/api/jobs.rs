//! Background job status and result download

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use super::convert::midi_attachment;
use crate::error::{ApiError, ApiResult};
use crate::models::{ConversionJob, JobStatus};
use crate::AppState;

/// Malformed ids are reported the same as unknown ones
async fn find_job(state: &AppState, task_id: &str) -> ApiResult<ConversionJob> {
    let not_found = || ApiError::NotFound("Task not found".to_string());
    let job_id = Uuid::parse_str(task_id).map_err(|_| not_found())?;
    state.jobs.get(job_id).await.ok_or_else(not_found)
}

/// GET /status/:task_id
pub async fn job_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let job = find_job(&state, &task_id).await?;

    let response = match job.status {
        JobStatus::Processing => Json(json!({
            "status": job.status,
            "message": job.message,
        }))
        .into_response(),
        JobStatus::Completed => Json(json!({
            "status": job.status,
            "download_url": format!("/download/{}", job.job_id),
        }))
        .into_response(),
        JobStatus::Error => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": job.status,
                "error": job.error.unwrap_or_default(),
            })),
        )
            .into_response(),
    };
    Ok(response)
}

/// GET /download/:task_id
pub async fn download_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let job = find_job(&state, &task_id).await?;

    match (job.status, job.midi_path) {
        (JobStatus::Completed, Some(midi_path)) => midi_attachment(&midi_path).await,
        _ => Err(ApiError::BadRequest(
            "Conversion not completed yet".to_string(),
        )),
    }
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/status/:task_id", get(job_status))
        .route("/download/:task_id", get(download_result))
}
