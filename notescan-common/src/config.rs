//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a TOML file. Every field has a built-in
//! default, so a missing config file never prevents startup.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `NOTESCAN_ROOT_FOLDER` environment variable
//! 3. `root_folder` key in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "NOTESCAN_ROOT_FOLDER";

/// Environment variable pointing at a config file
pub const CONFIG_PATH_ENV: &str = "NOTESCAN_CONFIG";

/// Subdirectory of the root folder receiving uploaded images
pub const UPLOADS_DIR: &str = "uploads";

/// Subdirectory of the root folder receiving per-job conversion output
pub const OUTPUT_DIR: &str = "output";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder for uploads and conversion output
    pub root_folder: Option<PathBuf>,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Optical music recognition engine settings
    pub omr: OmrConfig,

    /// MusicXML to MIDI translator settings
    pub translator: TranslatorConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Image converted when a request carries no file (relative to root folder)
    pub default_test_image: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_upload_bytes: 20 * 1024 * 1024,
            default_test_image: PathBuf::from(UPLOADS_DIR).join("testimage.png"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Which OMR engine handles recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OmrEngineKind {
    /// Audiveris (Java)
    #[default]
    Audiveris,
    /// oemer (Python package)
    Oemer,
    /// Fixed C-major scale, no recognition
    Demo,
}

impl fmt::Display for OmrEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OmrEngineKind::Audiveris => "audiveris",
            OmrEngineKind::Oemer => "oemer",
            OmrEngineKind::Demo => "demo",
        };
        f.write_str(name)
    }
}

impl FromStr for OmrEngineKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audiveris" => Ok(OmrEngineKind::Audiveris),
            "oemer" => Ok(OmrEngineKind::Oemer),
            "demo" => Ok(OmrEngineKind::Demo),
            other => Err(Error::InvalidInput(format!(
                "Unknown OMR engine '{}' (expected audiveris, oemer or demo)",
                other
            ))),
        }
    }
}

/// OMR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OmrConfig {
    pub engine: OmrEngineKind,
    /// Java launcher used for Audiveris
    pub java: String,
    /// Arguments passed to `java` ahead of the Audiveris ones, e.g. `-Xmx2g`
    pub java_args: Vec<String>,
    /// Explicit Audiveris JAR, searched before the built-in candidate list
    pub audiveris_jar: Option<PathBuf>,
    /// oemer executable
    pub oemer: String,
    /// Arguments placed before the image, e.g. `["-m", "oemer"]` with `oemer = "python3"`
    pub oemer_args: Vec<String>,
    /// Wall-clock limit for one recognition run
    pub timeout_secs: u64,
}

impl Default for OmrConfig {
    fn default() -> Self {
        Self {
            engine: OmrEngineKind::default(),
            java: "java".to_string(),
            java_args: Vec::new(),
            audiveris_jar: None,
            oemer: "oemer".to_string(),
            oemer_args: Vec::new(),
            timeout_secs: 300,
        }
    }
}

/// Which translator turns MusicXML into MIDI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorKind {
    /// In-process MusicXML reader and SMF writer
    #[default]
    Builtin,
    /// External program (music21 by default)
    Command,
}

impl fmt::Display for TranslatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TranslatorKind::Builtin => "builtin",
            TranslatorKind::Command => "command",
        };
        f.write_str(name)
    }
}

impl FromStr for TranslatorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "builtin" => Ok(TranslatorKind::Builtin),
            "command" => Ok(TranslatorKind::Command),
            other => Err(Error::InvalidInput(format!(
                "Unknown translator '{}' (expected builtin or command)",
                other
            ))),
        }
    }
}

/// MusicXML to MIDI translator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub kind: TranslatorKind,
    /// Program run by the command translator
    pub program: String,
    /// Arguments for the command translator; `{input}` and `{output}` are substituted
    pub args: Vec<String>,
    pub timeout_secs: u64,
    /// MIDI resolution used by the builtin translator
    pub ticks_per_quarter: u16,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            kind: TranslatorKind::default(),
            program: "python3".to_string(),
            args: vec![
                "-c".to_string(),
                "import sys; from music21 import converter; \
                 converter.parse(sys.argv[1]).write('midi', fp=sys.argv[2])"
                    .to_string(),
                "{input}".to_string(),
                "{output}".to_string(),
            ],
            timeout_secs: 120,
            ticks_per_quarter: 480,
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse config text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Locate and load the config file.
    ///
    /// An explicitly named file (argument or `NOTESCAN_CONFIG`) must exist and
    /// parse. The per-user default location is optional: when it is missing,
    /// built-in defaults are used.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = Self::load(&path)?;
            info!("Loaded config from {}", path.display());
            return Ok((config, Some(path)));
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                let config = Self::load(&path)?;
                info!("Loaded config from {}", path.display());
                Ok((config, Some(path)))
            }
            Some(path) => {
                warn!(
                    "No config file at {}, using built-in defaults",
                    path.display()
                );
                Ok((Self::default(), None))
            }
            None => {
                warn!("Could not determine config directory, using built-in defaults");
                Ok((Self::default(), None))
            }
        }
    }
}

/// Per-user config file location (`~/.config/notescan/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("notescan").join("config.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("notescan"))
        .unwrap_or_else(|| PathBuf::from("./notescan_data"))
}

/// Resolves the root folder from CLI, environment, TOML and compiled default
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root_folder: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root_folder: config.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Some(path) = std::env::var_os(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root_folder {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Creates the root folder layout and resolves paths inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create root, uploads and output directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        for dir in [self.root.clone(), self.uploads_dir(), self.output_dir()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                info!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Absolute paths are returned unchanged; relative ones are joined onto the root
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.omr.engine, OmrEngineKind::Audiveris);
        assert_eq!(config.omr.timeout_secs, 300);
        assert_eq!(config.translator.kind, TranslatorKind::Builtin);
        assert_eq!(config.translator.ticks_per_quarter, 480);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::parse(
            r#"
            [server]
            port = 8000

            [omr]
            engine = "demo"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.omr.engine, OmrEngineKind::Demo);
        assert_eq!(config.omr.java, "java");
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_invalid_engine_rejected() {
        let err = TomlConfig::parse("[omr]\nengine = \"tesseract\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("Audiveris".parse::<OmrEngineKind>().unwrap(), OmrEngineKind::Audiveris);
        assert_eq!(" oemer ".parse::<OmrEngineKind>().unwrap(), OmrEngineKind::Oemer);
        assert!("nope".parse::<OmrEngineKind>().is_err());
        assert_eq!("command".parse::<TranslatorKind>().unwrap(), TranslatorKind::Command);
    }

    #[test]
    fn test_default_translator_args_have_placeholders() {
        let config = TranslatorConfig::default();
        assert!(config.args.iter().any(|a| a == "{input}"));
        assert!(config.args.iter().any(|a| a == "{output}"));
    }

    #[test]
    fn test_resolve_path() {
        let init = RootFolderInitializer::new(PathBuf::from("/srv/notescan"));
        assert_eq!(
            init.resolve_path(Path::new("uploads/a.png")),
            PathBuf::from("/srv/notescan/uploads/a.png")
        );
        assert_eq!(init.resolve_path(Path::new("/tmp/a.png")), PathBuf::from("/tmp/a.png"));
    }
}
