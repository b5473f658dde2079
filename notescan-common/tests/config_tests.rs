//! Configuration loading and root folder resolution tests
//!
//! Tests that manipulate NOTESCAN_ROOT_FOLDER or NOTESCAN_CONFIG are marked
//! with #[serial] so they never run in parallel.

use notescan_common::config::{
    default_root_folder, OmrEngineKind, RootFolderInitializer, RootFolderResolver, TomlConfig,
    TranslatorKind, CONFIG_PATH_ENV, ROOT_FOLDER_ENV,
};
use notescan_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
#[serial]
fn test_resolver_cli_arg_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/notescan-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/notescan-toml")),
        ..Default::default()
    };

    let resolver = RootFolderResolver::new(Some(PathBuf::from("/tmp/notescan-cli")), &config);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/notescan-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/notescan-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/notescan-toml")),
        ..Default::default()
    };

    let resolver = RootFolderResolver::new(None, &config);
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/notescan-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_resolver_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/notescan-toml")),
        ..Default::default()
    };
    assert_eq!(
        RootFolderResolver::new(None, &config).resolve(),
        PathBuf::from("/tmp/notescan-toml")
    );

    let resolver = RootFolderResolver::new(None, &TomlConfig::default());
    assert_eq!(resolver.resolve(), default_root_folder());
}

#[test]
fn test_initializer_creates_layout() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("nested").join("root");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert!(initializer.uploads_dir().is_dir());
    assert!(initializer.output_dir().is_dir());

    // Second call is a no-op
    initializer.ensure_directory_exists().unwrap();
}

#[test]
#[serial]
fn test_discover_explicit_file() {
    env::remove_var(CONFIG_PATH_ENV);
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("notescan.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/srv/notescan"

[server]
port = 8000

[omr]
engine = "oemer"
oemer = "python3"
oemer_args = ["-m", "oemer"]
timeout_secs = 60

[translator]
kind = "command"
program = "mscore"
args = ["-o", "{output}", "{input}"]
"#,
    )
    .unwrap();

    let (config, found) = TomlConfig::discover(Some(&path)).unwrap();
    assert_eq!(found, Some(path));
    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/notescan")));
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.omr.engine, OmrEngineKind::Oemer);
    assert_eq!(config.omr.timeout_secs, 60);
    assert_eq!(config.omr.oemer, "python3");
    assert_eq!(config.omr.oemer_args, vec!["-m", "oemer"]);
    assert!(config.omr.java_args.is_empty());
    assert_eq!(config.translator.kind, TranslatorKind::Command);
    assert_eq!(config.translator.program, "mscore");
    assert_eq!(config.translator.args, vec!["-o", "{output}", "{input}"]);
}

#[test]
#[serial]
fn test_discover_missing_explicit_file_is_error() {
    env::remove_var(CONFIG_PATH_ENV);
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("absent.toml");

    let err = TomlConfig::discover(Some(&missing)).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
#[serial]
fn test_discover_from_env_var() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("env.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
    env::set_var(CONFIG_PATH_ENV, &path);

    let (config, found) = TomlConfig::discover(None).unwrap();
    assert_eq!(found, Some(path));
    assert_eq!(config.logging.level, "debug");

    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("bad.toml");
    std::fs::write(&path, "[server\nport = ").unwrap();

    let err = TomlConfig::load(&path).unwrap_err();
    match err {
        Error::Config(msg) => assert!(msg.contains("bad.toml")),
        other => panic!("expected config error, got {:?}", other),
    }
}
