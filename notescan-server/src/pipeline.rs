//! Image -> OMR -> MIDI conversion pipeline

use notescan_common::config::{RootFolderInitializer, TomlConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::midi::validate_midi_file;
use crate::omr::{build_engine, OmrEngine, OmrError, OmrOutput};
use crate::translate::{build_translator, MidiTranslator, TranslateError};

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Input image not found: {0}")]
    InputNotFound(String),

    #[error(transparent)]
    Omr(#[from] OmrError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("Output is not a valid MIDI file: {0}")]
    InvalidMidi(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ConversionPipeline {
    engine: Arc<dyn OmrEngine>,
    translator: Arc<dyn MidiTranslator>,
    output_root: PathBuf,
}

impl ConversionPipeline {
    pub fn new(
        engine: Arc<dyn OmrEngine>,
        translator: Arc<dyn MidiTranslator>,
        output_root: PathBuf,
    ) -> Self {
        Self {
            engine,
            translator,
            output_root,
        }
    }

    /// Engine and translator chosen by configuration, jobs under `<root>/output`
    pub fn from_config(config: &TomlConfig, root: &RootFolderInitializer) -> Self {
        Self::new(
            build_engine(&config.omr, root.root()),
            build_translator(&config.translator),
            root.output_dir(),
        )
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn translator_name(&self) -> &'static str {
        self.translator.name()
    }

    /// Report whether the OMR toolchain is usable
    pub async fn check(&self) -> Result<String, OmrError> {
        self.engine.check().await
    }

    pub fn work_dir(&self, job_id: Uuid) -> PathBuf {
        self.output_root.join(job_id.to_string())
    }

    /// Convert `image` in the job's own work directory
    pub async fn convert(&self, job_id: Uuid, image: &Path) -> Result<PathBuf, ConversionError> {
        let work_dir = self.work_dir(job_id);
        info!(job_id = %job_id, work_dir = %work_dir.display(), "Starting conversion");
        self.convert_into(image, &work_dir).await
    }

    /// Convert `image`, writing all artifacts under `work_dir`; returns the MIDI path
    pub async fn convert_into(
        &self,
        image: &Path,
        work_dir: &Path,
    ) -> Result<PathBuf, ConversionError> {
        if !tokio::fs::try_exists(image).await? {
            return Err(ConversionError::InputNotFound(image.display().to_string()));
        }
        tokio::fs::create_dir_all(work_dir).await?;

        let started = Instant::now();
        let output = self.engine.recognize(image, work_dir).await?;
        info!(
            engine = self.engine.name(),
            output = %output.path().display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recognition finished"
        );

        let midi_path = match output {
            OmrOutput::Midi(path) => path,
            OmrOutput::MusicXml(musicxml) => {
                let stem = musicxml
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "score".to_string());
                let midi_path = work_dir.join(format!("{}.mid", stem));

                let started = Instant::now();
                self.translator.translate(&musicxml, &midi_path).await?;
                info!(
                    translator = self.translator.name(),
                    output = %midi_path.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Translation finished"
                );
                midi_path
            }
        };

        if !validate_midi_file(&midi_path).await? {
            return Err(ConversionError::InvalidMidi(midi_path.display().to_string()));
        }
        Ok(midi_path)
    }
}
