//! In-process MusicXML to MIDI translator

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::{musicxml, smf, MidiTranslator, TranslateError};

pub struct BuiltinTranslator {
    ticks_per_quarter: u16,
}

impl BuiltinTranslator {
    pub fn new(ticks_per_quarter: u16) -> Self {
        Self {
            ticks_per_quarter: ticks_per_quarter.max(1),
        }
    }

    /// Parse MusicXML/MXL bytes and render them as SMF bytes
    pub fn render(&self, bytes: &[u8]) -> Result<Vec<u8>, TranslateError> {
        let score = musicxml::read_score(bytes, self.ticks_per_quarter)?;
        smf::write_smf(&score)
    }
}

#[async_trait]
impl MidiTranslator for BuiltinTranslator {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn translate(&self, musicxml: &Path, midi_out: &Path) -> Result<(), TranslateError> {
        let bytes = tokio::fs::read(musicxml).await?;

        let translator = Self::new(self.ticks_per_quarter);
        let midi = tokio::task::spawn_blocking(move || translator.render(&bytes))
            .await
            .map_err(|e| TranslateError::Io(std::io::Error::other(e)))??;

        tokio::fs::write(midi_out, &midi).await?;
        info!(
            input = %musicxml.display(),
            output = %midi_out.display(),
            bytes = midi.len(),
            "Translated MusicXML to MIDI"
        );
        Ok(())
    }
}
