//! Audiveris (Java) OMR engine
//!
//! Runs Audiveris in batch mode with export enabled. Audiveris writes an
//! `.mxl` per sheet (and, with some plugins, MIDI) under the output directory.

use async_trait::async_trait;
use notescan_common::config::OmrConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::output::scan_exports;
use super::{ensure_input_exists, OmrEngine, OmrError, OmrOutput};
use crate::toolchain::{query_tool, run_tool, ToolError};

pub const AUDIVERIS_VERSION: &str = "5.3";

const MAIN_CLASS: &str = "org.audiveris.omr.Main";

/// Directory under the base dir that may hold a bundled placeholder JAR
const BUNDLED_DIR: &str = "audiveris";

/// JAR locations searched after the configured one, relative paths anchored at the base dir
const JAR_CANDIDATES: &[&str] = &[
    "audiveris/audiveris-5.3.jar",
    "audiveris/audiveris.jar",
    "audiveris-5.3/lib/audiveris-5.3.jar",
    "audiveris/lib/audiveris-5.3.jar",
    "audiveris.jar",
    "/usr/local/lib/audiveris.jar",
    "/opt/audiveris/audiveris.jar",
];

/// Files this small are never a real Audiveris JAR
const PLACEHOLDER_MAX_BYTES: u64 = 1000;

#[cfg(windows)]
const CLASSPATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const CLASSPATH_SEPARATOR: &str = ":";

pub struct AudiverisEngine {
    java: String,
    java_args: Vec<OsString>,
    explicit_jar: Option<PathBuf>,
    base_dir: PathBuf,
    timeout: Duration,
}

impl AudiverisEngine {
    pub fn new(config: &OmrConfig, base_dir: &Path) -> Self {
        Self {
            java: config.java.clone(),
            java_args: config.java_args.iter().map(OsString::from).collect(),
            explicit_jar: config.audiveris_jar.clone(),
            base_dir: base_dir.to_path_buf(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Candidate JAR paths in search order
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        self.explicit_jar
            .iter()
            .cloned()
            .chain(JAR_CANDIDATES.iter().map(PathBuf::from))
            .map(|p| if p.is_absolute() { p } else { self.base_dir.join(p) })
            .collect()
    }

    /// First candidate that exists and is not a placeholder file
    ///
    /// Only JARs inside the bundled `audiveris/` directory are checked for
    /// placeholder content.
    pub fn find_jar(&self) -> Option<PathBuf> {
        let bundled = self.base_dir.join(BUNDLED_DIR);
        for path in self.candidate_paths() {
            if !path.is_file() {
                continue;
            }
            if path.starts_with(&bundled) && is_placeholder(&path) {
                warn!("Found placeholder JAR at {}, skipping", path.display());
                continue;
            }
            debug!("Found Audiveris JAR at {}", path.display());
            return Some(path);
        }
        None
    }

    fn missing_jar_message(&self) -> String {
        let searched: Vec<String> = self
            .candidate_paths()
            .iter()
            .map(|p| format!("  - {}", p.display()))
            .collect();
        format!(
            "No Audiveris JAR file found. Download Audiveris {v} from \
             https://github.com/Audiveris/audiveris/releases/tag/{v}, extract it and copy \
             lib/audiveris-{v}.jar to one of:\n{}",
            searched.join("\n"),
            v = AUDIVERIS_VERSION
        )
    }

    /// Launcher arguments for one batch run
    ///
    /// A `lib/` directory next to the JAR means an unpacked distribution whose
    /// dependencies must go on the classpath; otherwise the JAR's manifest is used.
    pub fn build_args(jar: &Path, image: &Path, out_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        let lib_dir = jar.parent().map(|dir| dir.join("lib"));
        match lib_dir {
            Some(lib) if lib.is_dir() => {
                let classpath = format!(
                    "{}{}{}",
                    jar.display(),
                    CLASSPATH_SEPARATOR,
                    lib.join("*").display()
                );
                args.push("-cp".into());
                args.push(classpath.into());
                args.push(MAIN_CLASS.into());
            }
            _ => {
                args.push("-jar".into());
                args.push(jar.as_os_str().to_owned());
            }
        }

        args.push("-batch".into());
        args.push("-export".into());
        args.push("-output".into());
        args.push(out_dir.as_os_str().to_owned());
        args.push(image.as_os_str().to_owned());
        args
    }
}

/// Small file whose text mentions "placeholder"
fn is_placeholder(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if metadata.len() >= PLACEHOLDER_MAX_BYTES {
        return false;
    }
    std::fs::read(path)
        .map(|bytes| {
            String::from_utf8_lossy(&bytes)
                .to_lowercase()
                .contains("placeholder")
        })
        .unwrap_or(false)
}

#[async_trait]
impl OmrEngine for AudiverisEngine {
    fn name(&self) -> &'static str {
        "audiveris"
    }

    async fn check(&self) -> Result<String, OmrError> {
        let java_version = match query_tool(&self.java, &["-version"]).await {
            Ok(line) => line,
            Err(ToolError::NotFound { .. }) => {
                return Err(OmrError::Setup(format!(
                    "Java not found ({}). Install Java 11 or higher \
                     (Debian/Ubuntu: apt-get install openjdk-17-jre, macOS: brew install openjdk)",
                    self.java
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let jar = self
            .find_jar()
            .ok_or_else(|| OmrError::Setup(self.missing_jar_message()))?;

        Ok(format!(
            "Java: {}; Audiveris JAR: {}",
            java_version,
            jar.display()
        ))
    }

    async fn recognize(&self, image: &Path, out_dir: &Path) -> Result<OmrOutput, OmrError> {
        ensure_input_exists(image).await?;
        let jar = self
            .find_jar()
            .ok_or_else(|| OmrError::Setup(self.missing_jar_message()))?;

        tokio::fs::create_dir_all(out_dir).await?;
        let image = tokio::fs::canonicalize(image).await?;
        let out_dir = tokio::fs::canonicalize(out_dir).await?;

        info!(
            image = %image.display(),
            output = %out_dir.display(),
            "Running Audiveris"
        );

        let mut args = self.java_args.clone();
        args.extend(Self::build_args(&jar, &image, &out_dir));
        let output = run_tool(&self.java, &args, self.timeout).await?;
        info!(
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Audiveris processing completed"
        );

        let exports = {
            let dir = out_dir.clone();
            tokio::task::spawn_blocking(move || scan_exports(&dir))
                .await
                .map_err(|e| OmrError::Io(std::io::Error::other(e)))?
        };

        if let Some(midi) = exports.midi.first() {
            return Ok(OmrOutput::Midi(midi.clone()));
        }
        if let Some(musicxml) = exports.musicxml.first() {
            return Ok(OmrOutput::MusicXml(musicxml.clone()));
        }

        Err(OmrError::NoOutput {
            engine: "Audiveris",
            dir: out_dir.display().to_string(),
            found: exports.describe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(base_dir: &Path, java: &str, jar: Option<PathBuf>) -> AudiverisEngine {
        let config = OmrConfig {
            java: java.to_string(),
            audiveris_jar: jar,
            timeout_secs: 10,
            ..Default::default()
        };
        AudiverisEngine::new(&config, base_dir)
    }

    /// Engine whose `java` is `sh -c <script>`; the script sees the Audiveris arguments as `$1..`
    #[cfg(unix)]
    fn shell_engine(base_dir: &Path, script: &str, jar: PathBuf) -> AudiverisEngine {
        let config = OmrConfig {
            java: "sh".to_string(),
            java_args: vec!["-c".to_string(), script.to_string(), "fake-java".to_string()],
            audiveris_jar: Some(jar),
            timeout_secs: 10,
            ..Default::default()
        };
        AudiverisEngine::new(&config, base_dir)
    }

    #[test]
    fn test_candidates_anchor_relative_paths() {
        let engine = engine_with(Path::new("/srv/notescan"), "java", Some(PathBuf::from("custom.jar")));
        let candidates = engine.candidate_paths();
        assert_eq!(candidates[0], PathBuf::from("/srv/notescan/custom.jar"));
        assert_eq!(candidates[1], PathBuf::from("/srv/notescan/audiveris/audiveris-5.3.jar"));
        assert!(candidates.contains(&PathBuf::from("/opt/audiveris/audiveris.jar")));
    }

    #[test]
    fn test_placeholder_jar_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let audiveris = dir.path().join("audiveris");
        std::fs::create_dir_all(&audiveris).unwrap();
        std::fs::write(audiveris.join("audiveris-5.3.jar"), b"PLACEHOLDER - download the real JAR").unwrap();
        let real = audiveris.join("audiveris.jar");
        std::fs::write(&real, vec![0u8; 2048]).unwrap();

        let engine = engine_with(dir.path(), "java", None);
        assert_eq!(engine.find_jar(), Some(real));
    }

    #[test]
    fn test_placeholder_check_limited_to_bundled_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root_jar = dir.path().join("audiveris.jar");
        std::fs::write(&root_jar, b"placeholder").unwrap();

        let engine = engine_with(dir.path(), "java", None);
        assert_eq!(engine.find_jar(), Some(root_jar));
    }

    #[test]
    fn test_no_jar_found() {
        let dir = tempfile::tempdir().unwrap();
        let audiveris = dir.path().join("audiveris");
        std::fs::create_dir_all(&audiveris).unwrap();
        std::fs::write(audiveris.join("audiveris.jar"), b"placeholder").unwrap();

        let engine = engine_with(dir.path(), "java", None);
        // Host-wide candidates may exist; nothing under the base dir qualifies
        assert!(!engine
            .find_jar()
            .is_some_and(|jar| jar.starts_with(dir.path())));

        let message = engine.missing_jar_message();
        assert!(message.contains("Audiveris 5.3"));
        assert!(message.contains(&audiveris.join("audiveris-5.3.jar").display().to_string()));
        assert!(message.contains(&dir.path().join("audiveris.jar").display().to_string()));
        assert!(message.contains("/opt/audiveris/audiveris.jar"));
    }

    #[test]
    fn test_build_args_single_jar() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("audiveris.jar");
        let args = AudiverisEngine::build_args(&jar, Path::new("/in/scan.png"), Path::new("/out"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "-jar".to_string(),
                jar.display().to_string(),
                "-batch".to_string(),
                "-export".to_string(),
                "-output".to_string(),
                "/out".to_string(),
                "/in/scan.png".to_string(),
            ]
        );
    }

    #[test]
    fn test_build_args_with_lib_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        let jar = dir.path().join("audiveris-5.3.jar");
        let args = AudiverisEngine::build_args(&jar, Path::new("/in/scan.png"), Path::new("/out"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[0], "-cp");
        assert!(args[1].starts_with(&jar.display().to_string()));
        assert!(args[1].ends_with('*'));
        assert_eq!(args[2], MAIN_CLASS);
        assert_eq!(args[3], "-batch");
    }

    #[tokio::test]
    async fn test_check_reports_missing_java() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), "notescan-no-such-java", None);
        let err = engine.check().await.unwrap_err();
        match err {
            OmrError::Setup(msg) => assert!(msg.contains("Java 11")),
            other => panic!("expected setup error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recognize_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), "java", None);
        let err = engine
            .recognize(&dir.path().join("absent.png"), &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, OmrError::InputNotFound(_)));
    }

    /// Fake `java` that writes an .mxl into the directory following `-output`
    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognize_with_fake_java() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("audiveris.jar");
        std::fs::write(&jar, vec![0u8; 2048]).unwrap();
        let image = dir.path().join("scan.png");
        std::fs::write(&image, b"\x89PNG").unwrap();

        let engine = shell_engine(
            dir.path(),
            "while [ \"$1\" != \"-output\" ]; do shift; done; \
             mkdir -p \"$2/scan\" && printf 'PK' > \"$2/scan/scan.mxl\"",
            jar,
        );
        let output = engine.recognize(&image, &dir.path().join("out")).await.unwrap();
        match output {
            OmrOutput::MusicXml(path) => assert!(path.ends_with("scan/scan.mxl")),
            other => panic!("expected MusicXML, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognize_failure_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("audiveris.jar");
        std::fs::write(&jar, vec![0u8; 2048]).unwrap();
        let image = dir.path().join("scan.png");
        std::fs::write(&image, b"\x89PNG").unwrap();

        let engine = shell_engine(dir.path(), "echo 'Could not load sheet' >&2; exit 1", jar);
        let err = engine.recognize(&image, &dir.path().join("out")).await.unwrap_err();
        assert!(err.to_string().contains("Could not load sheet"));
    }
}
