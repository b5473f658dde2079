//! notescan-server library interface
//!
//! Sheet-music image to MIDI conversion over HTTP. Exposed as a library so
//! the CLI and the integration tests share the pipeline and router.

pub mod api;
pub mod error;
pub mod jobs;
pub mod midi;
pub mod models;
pub mod omr;
pub mod pipeline;
pub mod toolchain;
pub mod translate;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use notescan_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::jobs::JobStore;
use crate::pipeline::ConversionPipeline;

/// Where uploads go and what to do when none is sent
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub uploads_dir: PathBuf,
    /// Converted when a request carries no file
    pub default_test_image: PathBuf,
    pub max_upload_bytes: usize,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobStore,
    pub pipeline: Arc<ConversionPipeline>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub uploads: Arc<UploadSettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last conversion error, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(pipeline: ConversionPipeline, event_bus: EventBus, uploads: UploadSettings) -> Self {
        Self {
            jobs: JobStore::new(event_bus.clone()),
            pipeline: Arc::new(pipeline),
            event_bus,
            uploads: Arc::new(uploads),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let body_limit = state.uploads.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::convert_routes())
        .merge(api::job_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
