//! Background conversion jobs
//!
//! One detached tokio task per accepted request; no cancellation.

use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

/// Spawn the conversion of an already-registered job
pub fn spawn_conversion_job(state: AppState, job_id: Uuid, image: PathBuf) {
    tokio::spawn(async move {
        run_conversion_job(state, job_id, image).await;
    });
}

/// Run the pipeline for `job_id` and record its terminal state
pub async fn run_conversion_job(state: AppState, job_id: Uuid, image: PathBuf) {
    let result = state.pipeline.convert(job_id, &image).await;

    let recorded = match result {
        Ok(midi_path) => {
            info!(job_id = %job_id, midi = %midi_path.display(), "Conversion completed");
            state.jobs.complete(job_id, midi_path).await
        }
        Err(e) => {
            let message = e.to_string();
            error!(job_id = %job_id, error = %message, "Conversion failed");
            state.record_error(message.clone()).await;
            state.jobs.fail(job_id, message).await
        }
    };

    if let Err(e) = recorded {
        warn!(job_id = %job_id, error = %e, "Could not record job result");
    }
}
