//! Conversion job record
//!
//! A job starts in `processing` and moves to exactly one terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

pub const PROCESSING_MESSAGE: &str = "Converting image to MIDI...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

/// Background conversion (in-memory only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
    /// Uploaded image the job converts
    pub source: PathBuf,
    /// Set once completed
    pub midi_path: Option<PathBuf>,
    /// Set once failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ConversionJob {
    pub fn new(job_id: Uuid, source: PathBuf) -> Self {
        Self {
            job_id,
            status: JobStatus::Processing,
            message: PROCESSING_MESSAGE.to_string(),
            source,
            midi_path: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Mark completed. Returns false (and changes nothing) if already terminal.
    pub fn complete(&mut self, midi_path: PathBuf) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.message = "Conversion completed".to_string();
        self.midi_path = Some(midi_path);
        self.finished_at = Some(Utc::now());
        true
    }

    /// Mark failed. Returns false (and changes nothing) if already terminal.
    pub fn fail(&mut self, error: String) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Error;
        self.message = "Conversion failed".to_string();
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn elapsed_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.created_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
