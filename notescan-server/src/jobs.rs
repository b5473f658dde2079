//! In-memory job store for background conversions
//!
//! Jobs live for the lifetime of the process. Every state change is
//! broadcast on the [`EventBus`].

use chrono::Utc;
use notescan_common::events::{ConversionEvent, EventBus};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ConversionJob, JobStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Task {0} already finished")]
    AlreadyFinished(Uuid),
}

/// Number of jobs per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
}

#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<Uuid, ConversionJob>>>,
    event_bus: EventBus,
}

impl JobStore {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            event_bus,
        }
    }

    /// Register a new job in `processing` state
    ///
    /// `source` must already be on disk.
    pub async fn create(&self, job_id: Uuid, source: PathBuf) -> ConversionJob {
        let job = ConversionJob::new(job_id, source);
        let previous = self.jobs.write().await.insert(job_id, job.clone());
        if previous.is_some() {
            warn!(job_id = %job_id, "Replaced existing job with same id");
        }

        let source = job
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.event_bus.emit_lossy(ConversionEvent::JobStarted {
            job_id,
            source,
            timestamp: Utc::now(),
        });
        debug!(job_id = %job_id, "Job created");
        job
    }

    pub async fn get(&self, job_id: Uuid) -> Option<ConversionJob> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    pub async fn complete(&self, job_id: Uuid, midi_path: PathBuf) -> Result<(), JobError> {
        let elapsed_ms = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(&job_id).ok_or(JobError::NotFound(job_id))?;
            if !job.complete(midi_path.clone()) {
                return Err(JobError::AlreadyFinished(job_id));
            }
            job.elapsed_ms()
        };

        self.event_bus.emit_lossy(ConversionEvent::JobCompleted {
            job_id,
            midi_path: midi_path.display().to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn fail(&self, job_id: Uuid, error: String) -> Result<(), JobError> {
        {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get_mut(&job_id).ok_or(JobError::NotFound(job_id))?;
            if !job.fail(error.clone()) {
                return Err(JobError::AlreadyFinished(job_id));
            }
        }

        self.event_bus.emit_lossy(ConversionEvent::JobFailed {
            job_id,
            error,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn counts(&self) -> JobCounts {
        self.jobs
            .read()
            .await
            .values()
            .fold(JobCounts::default(), |mut counts, job| {
                match job.status {
                    JobStatus::Processing => counts.processing += 1,
                    JobStatus::Completed => counts.completed += 1,
                    JobStatus::Error => counts.error += 1,
                }
                counts
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (JobStore, EventBus) {
        let bus = EventBus::new(16);
        (JobStore::new(bus.clone()), bus)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (jobs, _) = store();
        let id = Uuid::new_v4();
        jobs.create(id, PathBuf::from("uploads/x_score.png")).await;

        let job = jobs.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(jobs.counts().await.processing, 1);
        assert!(jobs.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_transitions_are_monotonic() {
        let (jobs, _) = store();
        let id = Uuid::new_v4();
        jobs.create(id, PathBuf::from("a.png")).await;

        jobs.complete(id, PathBuf::from("a.mid")).await.unwrap();
        assert_eq!(
            jobs.fail(id, "late".to_string()).await,
            Err(JobError::AlreadyFinished(id))
        );
        assert_eq!(
            jobs.complete(id, PathBuf::from("b.mid")).await,
            Err(JobError::AlreadyFinished(id))
        );

        let job = jobs.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.midi_path, Some(PathBuf::from("a.mid")));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (jobs, _) = store();
        let id = Uuid::new_v4();
        assert_eq!(
            jobs.complete(id, PathBuf::from("a.mid")).await,
            Err(JobError::NotFound(id))
        );
        assert_eq!(
            jobs.fail(id, "x".to_string()).await,
            Err(JobError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn test_counts() {
        let (jobs, _) = store();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            jobs.create(*id, PathBuf::from("a.png")).await;
        }
        jobs.complete(ids[0], PathBuf::from("a.mid")).await.unwrap();
        jobs.fail(ids[1], "boom".to_string()).await.unwrap();

        assert_eq!(
            jobs.counts().await,
            JobCounts {
                processing: 2,
                completed: 1,
                error: 1
            }
        );
    }

    #[tokio::test]
    async fn test_transitions_emit_events() {
        let (jobs, bus) = store();
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        jobs.create(id, PathBuf::from("uploads/abc_score.png")).await;
        jobs.fail(id, "Audiveris failed".to_string()).await.unwrap();

        match rx.recv().await.unwrap() {
            ConversionEvent::JobStarted { job_id, source, .. } => {
                assert_eq!(job_id, id);
                assert_eq!(source, "abc_score.png");
            }
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            ConversionEvent::JobFailed { job_id, error, .. } => {
                assert_eq!(job_id, id);
                assert_eq!(error, "Audiveris failed");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
