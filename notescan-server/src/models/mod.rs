//! Data models for notescan-server

pub mod job;

pub use job::{ConversionJob, JobStatus};
