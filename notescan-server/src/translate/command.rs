//! External-command translator
//!
//! Runs a configured program with `{input}` and `{output}` substituted into
//! its arguments. The default invokes music21 through python3.

use async_trait::async_trait;
use notescan_common::config::TranslatorConfig;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::{MidiTranslator, TranslateError};
use crate::toolchain::run_tool;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

pub struct CommandTranslator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTranslator {
    pub fn new(config: &TranslatorConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Arguments with placeholders replaced; an argument that is exactly a
    /// placeholder is passed as the raw path
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT_PLACEHOLDER => input.as_os_str().to_owned(),
                OUTPUT_PLACEHOLDER => output.as_os_str().to_owned(),
                _ => arg
                    .replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                    .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy())
                    .into(),
            })
            .collect()
    }
}

#[async_trait]
impl MidiTranslator for CommandTranslator {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn translate(&self, musicxml: &Path, midi_out: &Path) -> Result<(), TranslateError> {
        let args = self.build_args(musicxml, midi_out);
        let output = run_tool(&self.program, &args, self.timeout).await?;

        if !tokio::fs::try_exists(midi_out).await.unwrap_or(false) {
            return Err(TranslateError::MissingOutput(midi_out.display().to_string()));
        }

        info!(
            program = %self.program,
            output = %midi_out.display(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Translated MusicXML to MIDI"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(program: &str, args: &[&str]) -> TranslatorConfig {
        TranslatorConfig {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_args_substitutes_placeholders() {
        let translator = CommandTranslator::new(&config(
            "conv",
            &["--in", "{input}", "--out={output}", "-q"],
        ));
        let args = translator.build_args(Path::new("/tmp/a.mxl"), Path::new("/tmp/a.mid"));
        assert_eq!(
            args,
            vec![
                OsString::from("--in"),
                OsString::from("/tmp/a.mxl"),
                OsString::from("--out=/tmp/a.mid"),
                OsString::from("-q"),
            ]
        );
    }

    #[test]
    fn test_default_args_end_with_paths() {
        let translator = CommandTranslator::new(&TranslatorConfig::default());
        let args = translator.build_args(Path::new("in.xml"), Path::new("out.mid"));
        let n = args.len();
        assert_eq!(args[n - 2], OsString::from("in.xml"));
        assert_eq!(args[n - 1], OsString::from("out.mid"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_translate_via_shell_copy() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("score.xml");
        let output = dir.path().join("score.mid");
        tokio::fs::write(&input, b"MThd fake").await.unwrap();

        let translator = CommandTranslator::new(&config("sh", &["-c", "cp \"$0\" \"$1\"", "{input}", "{output}"]));
        translator.translate(&input, &output).await.unwrap();
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"MThd fake");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_translate_without_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("score.xml");
        let output = dir.path().join("score.mid");
        tokio::fs::write(&input, b"<x/>").await.unwrap();

        let translator = CommandTranslator::new(&config("sh", &["-c", "true"]));
        let result = translator.translate(&input, &output).await;
        assert!(matches!(result, Err(TranslateError::MissingOutput(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_translate_command_failure() {
        let dir = tempfile::tempdir().unwrap();
        let translator =
            CommandTranslator::new(&config("sh", &["-c", "echo 'No module named music21' >&2; exit 1"]));
        let result = translator
            .translate(&dir.path().join("a.xml"), &dir.path().join("a.mid"))
            .await;
        match result {
            Err(TranslateError::Tool(e)) => assert!(e.to_string().contains("music21")),
            other => panic!("expected tool failure, got {:?}", other.map(|_| ())),
        }
    }
}
