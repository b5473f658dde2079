//! # notescan common library
//!
//! Shared code for the notescan binaries:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Conversion job lifecycle events and the event bus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
