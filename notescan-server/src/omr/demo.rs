//! Demo engine
//!
//! Performs no recognition: every image becomes the same C-major scale.
//! Useful for exercising the HTTP workflow on hosts without Java or Python.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::{ensure_input_exists, OmrEngine, OmrError, OmrOutput};
use crate::midi::demo_scale_smf;

#[derive(Debug, Default)]
pub struct DemoEngine;

impl DemoEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OmrEngine for DemoEngine {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn check(&self) -> Result<String, OmrError> {
        Ok("demo engine (C major scale, no recognition)".to_string())
    }

    async fn recognize(&self, image: &Path, out_dir: &Path) -> Result<OmrOutput, OmrError> {
        ensure_input_exists(image).await?;
        tokio::fs::create_dir_all(out_dir).await?;

        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "score".to_string());
        let midi_path = out_dir.join(format!("{}_converted.mid", stem));

        let midi = demo_scale_smf()?;
        tokio::fs::write(&midi_path, midi).await?;
        info!(midi = %midi_path.display(), "Demo engine wrote C major scale");

        Ok(OmrOutput::Midi(midi_path))
    }
}
