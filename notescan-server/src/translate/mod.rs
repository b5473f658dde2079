//! MusicXML to MIDI translation
//!
//! Two translators sit behind [`MidiTranslator`]: an external command
//! (music21 by default) and a builtin reader/writer pair.

pub mod builtin;
pub mod command;
pub mod musicxml;
pub mod score;
pub mod smf;

pub use builtin::BuiltinTranslator;
pub use command::CommandTranslator;

use async_trait::async_trait;
use notescan_common::config::{TranslatorConfig, TranslatorKind};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::toolchain::ToolError;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("xml parse error: {0}")]
    Xml(String),

    #[error("invalid musicxml: {0}")]
    Invalid(String),

    #[error("mxl archive error: {0}")]
    Archive(String),

    #[error("midi write error: {0}")]
    Midi(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Translator produced no output at {0}")]
    MissingOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait MidiTranslator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Translate the MusicXML (or `.mxl`) file at `musicxml` into a MIDI file at `midi_out`
    async fn translate(&self, musicxml: &Path, midi_out: &Path) -> Result<(), TranslateError>;
}

pub fn build_translator(config: &TranslatorConfig) -> Arc<dyn MidiTranslator> {
    match config.kind {
        TranslatorKind::Builtin => Arc::new(BuiltinTranslator::new(config.ticks_per_quarter)),
        TranslatorKind::Command => Arc::new(CommandTranslator::new(config)),
    }
}
