//! Locating the files an OMR tool exported

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Music files found under an engine's output directory, in file-name order
#[derive(Debug, Default)]
pub struct ExportedFiles {
    pub midi: Vec<PathBuf>,
    pub musicxml: Vec<PathBuf>,
    pub other: Vec<PathBuf>,
}

impl ExportedFiles {
    /// Comma-separated file names, for error messages
    pub fn describe(&self) -> String {
        let names: Vec<String> = self
            .midi
            .iter()
            .chain(&self.musicxml)
            .chain(&self.other)
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        if names.is_empty() {
            "nothing".to_string()
        } else {
            names.join(", ")
        }
    }
}

pub fn is_midi(path: &Path) -> bool {
    has_extension(path, &["mid", "midi"])
}

pub fn is_musicxml(path: &Path) -> bool {
    has_extension(path, &["mxl", "musicxml", "xml"])
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Recursively collect exported files under `dir`
pub fn scan_exports(dir: &Path) -> ExportedFiles {
    let mut files = ExportedFiles::default();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.into_path();
        if is_midi(&path) {
            files.midi.push(path);
        } else if is_musicxml(&path) {
            files.musicxml.push(path);
        } else {
            files.other.push(path);
        }
    }

    files
}
