//! HTTP API handlers for notescan-server

pub mod convert;
pub mod health;
pub mod jobs;
pub mod sse;
pub mod upload;

pub use convert::convert_routes;
pub use health::health_routes;
pub use jobs::job_routes;
pub use sse::event_stream;
