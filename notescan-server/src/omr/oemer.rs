//! oemer (Python) OMR engine
//!
//! `oemer <image> -o <dir>` writes `<stem>.musicxml` into `<dir>`.

use async_trait::async_trait;
use notescan_common::config::OmrConfig;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::output::scan_exports;
use super::{ensure_input_exists, OmrEngine, OmrError, OmrOutput};
use crate::toolchain::{query_tool, run_tool, ToolError};

pub struct OemerEngine {
    program: String,
    /// Placed before the image argument
    leading_args: Vec<OsString>,
    timeout: Duration,
}

impl OemerEngine {
    pub fn new(config: &OmrConfig) -> Self {
        Self {
            program: config.oemer.clone(),
            leading_args: config.oemer_args.iter().map(OsString::from).collect(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl OmrEngine for OemerEngine {
    fn name(&self) -> &'static str {
        "oemer"
    }

    async fn check(&self) -> Result<String, OmrError> {
        match query_tool(&self.program, &["--help"]).await {
            Ok(line) => Ok(format!("oemer: {}", line)),
            Err(ToolError::NotFound { .. }) => Err(OmrError::Setup(format!(
                "oemer not found ({}). Install it with: pip install oemer",
                self.program
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn recognize(&self, image: &Path, out_dir: &Path) -> Result<OmrOutput, OmrError> {
        ensure_input_exists(image).await?;
        tokio::fs::create_dir_all(out_dir).await?;

        info!(
            image = %image.display(),
            output = %out_dir.display(),
            "Running oemer"
        );

        let mut args = self.leading_args.clone();
        args.extend([
            image.as_os_str().to_owned(),
            "-o".into(),
            out_dir.as_os_str().to_owned(),
        ]);
        run_tool(&self.program, &args, self.timeout).await?;

        let dir = out_dir.to_path_buf();
        let exports = tokio::task::spawn_blocking(move || scan_exports(&dir))
            .await
            .map_err(|e| OmrError::Io(std::io::Error::other(e)))?;

        exports
            .musicxml
            .first()
            .cloned()
            .map(OmrOutput::MusicXml)
            .ok_or_else(|| OmrError::NoOutput {
                engine: "oemer",
                dir: out_dir.display().to_string(),
                found: exports.describe(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_missing_program() {
        let config = OmrConfig {
            oemer: "notescan-no-such-oemer".to_string(),
            ..Default::default()
        };
        let err = OemerEngine::new(&config).check().await.unwrap_err();
        assert!(err.to_string().contains("pip install oemer"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognize_picks_musicxml() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("etude.png");
        std::fs::write(&image, b"\x89PNG").unwrap();

        let config = OmrConfig {
            oemer: "sh".to_string(),
            oemer_args: vec![
                "-c".to_string(),
                "printf '<score-partwise/>' > \"$3/$(basename \"$1\" .png).musicxml\"".to_string(),
                "fake-oemer".to_string(),
            ],
            ..Default::default()
        };
        let output = OemerEngine::new(&config)
            .recognize(&image, &dir.path().join("out"))
            .await
            .unwrap();
        assert_eq!(output, OmrOutput::MusicXml(dir.path().join("out").join("etude.musicxml")));
    }
}
