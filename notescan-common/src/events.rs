//! Conversion job events
//!
//! Job lifecycle transitions are broadcast through [`EventBus`] and streamed
//! to HTTP clients as Server-Sent Events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Conversion job lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversionEvent {
    /// Background conversion accepted and started
    JobStarted {
        job_id: Uuid,
        /// File name of the uploaded image
        source: String,
        timestamp: DateTime<Utc>,
    },

    /// MIDI file is ready for download
    JobCompleted {
        job_id: Uuid,
        midi_path: String,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Conversion ended with an error
    JobFailed {
        job_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ConversionEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ConversionEvent::JobStarted { .. } => "JobStarted",
            ConversionEvent::JobCompleted { .. } => "JobCompleted",
            ConversionEvent::JobFailed { .. } => "JobFailed",
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            ConversionEvent::JobStarted { job_id, .. }
            | ConversionEvent::JobCompleted { job_id, .. }
            | ConversionEvent::JobFailed { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast channel for [`ConversionEvent`]s
///
/// Cloning is cheap; all clones share one channel. Subscribers that fall more
/// than `capacity` events behind skip the oldest ones.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ConversionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ConversionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ConversionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
