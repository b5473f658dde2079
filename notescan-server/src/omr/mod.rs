//! Optical music recognition engines
//!
//! Recognition itself is always delegated to an external program. Each engine
//! knows how to invoke its tool and where the tool leaves its results.

pub mod audiveris;
pub mod demo;
pub mod oemer;
pub mod output;

pub use audiveris::AudiverisEngine;
pub use demo::DemoEngine;
pub use oemer::OemerEngine;

use async_trait::async_trait;
use notescan_common::config::{OmrConfig, OmrEngineKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::toolchain::ToolError;

/// OMR engine errors
#[derive(Debug, Error)]
pub enum OmrError {
    #[error("Input file not found: {0}")]
    InputNotFound(String),

    /// Toolchain missing or misconfigured; message carries install guidance
    #[error("{0}")]
    Setup(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{engine} produced no music files in {dir} (found: {found})")]
    NoOutput {
        engine: &'static str,
        dir: String,
        found: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a recognition run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OmrOutput {
    /// MusicXML (plain or compressed `.mxl`), still to be translated
    MusicXml(PathBuf),
    /// The engine exported MIDI directly
    Midi(PathBuf),
}

impl OmrOutput {
    pub fn path(&self) -> &Path {
        match self {
            OmrOutput::MusicXml(path) | OmrOutput::Midi(path) => path,
        }
    }
}

#[async_trait]
pub trait OmrEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verify the toolchain is usable; returns a human-readable summary
    async fn check(&self) -> Result<String, OmrError>;

    /// Recognize `image`, leaving results under `out_dir`
    async fn recognize(&self, image: &Path, out_dir: &Path) -> Result<OmrOutput, OmrError>;
}

/// Build the configured engine
///
/// `base_dir` anchors relative tool paths such as the Audiveris JAR candidates.
pub fn build_engine(config: &OmrConfig, base_dir: &Path) -> Arc<dyn OmrEngine> {
    match config.engine {
        OmrEngineKind::Audiveris => Arc::new(AudiverisEngine::new(config, base_dir)),
        OmrEngineKind::Oemer => Arc::new(OemerEngine::new(config)),
        OmrEngineKind::Demo => Arc::new(DemoEngine::new()),
    }
}

async fn ensure_input_exists(image: &Path) -> Result<(), OmrError> {
    if tokio::fs::try_exists(image).await? {
        Ok(())
    } else {
        Err(OmrError::InputNotFound(image.display().to_string()))
    }
}
