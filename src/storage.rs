//! Program and configuration persistence
//!
//! Ensures atomic writes via temp files and renames, and normalises the
//! `.json` extension of saved Blockly programs.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::interpreter::{Step, parse_program};

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;

    file.write_all(data).context("Failed to write data")?;
    file.sync_all().context("Failed to sync file")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .with_context(|| format!("Failed to open directory: {:?}", parent))?;
        dir.sync_all().context("Failed to sync directory")?;
    }

    Ok(())
}

/// Read a file
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))
}

/// Append `.json` unless the path already carries it (case-insensitive).
pub fn program_path(path: &Path) -> PathBuf {
    let has_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if has_json {
        path.to_path_buf()
    } else {
        let mut raw = path.as_os_str().to_os_string();
        raw.push(".json");
        PathBuf::from(raw)
    }
}

/// Save the workspace JSON emitted by the block editor.
///
/// The text must be valid JSON; it is stored verbatim. Returns the final path.
pub fn save_program(path: &Path, program_json: &str) -> Result<PathBuf> {
    serde_json::from_str::<serde_json::Value>(program_json)
        .context("Refusing to save malformed program JSON")?;

    let final_path = program_path(path);
    write_atomic(&final_path, program_json.as_bytes())?;
    tracing::info!(path = ?final_path, "program saved");
    Ok(final_path)
}

/// Load and decode a program file.
pub fn load_program(path: &Path) -> Result<Vec<Step>> {
    let data = read_file(path)?;
    let text = String::from_utf8(data)
        .with_context(|| format!("Program file is not UTF-8: {:?}", path))?;
    let steps =
        parse_program(&text).with_context(|| format!("Failed to parse program: {:?}", path))?;
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn program_path_appends_extension() {
        assert_eq!(program_path(Path::new("demo")), PathBuf::from("demo.json"));
        assert_eq!(program_path(Path::new("demo.JSON")), PathBuf::from("demo.JSON"));
        assert_eq!(program_path(Path::new("demo.txt")), PathBuf::from("demo.txt.json"));
    }

    #[test]
    fn save_then_load_program() {
        let temp = TempDir::new().unwrap();
        let json = r#"[{"type": "print", "message": {"kind": "literal", "value": "hi"}}]"#;

        let saved = save_program(&temp.path().join("hello"), json).unwrap();
        assert_eq!(saved, temp.path().join("hello.json"));

        let steps = load_program(&saved).unwrap();
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn malformed_program_is_not_saved() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("broken");
        assert!(save_program(&target, "[{").is_err());
        assert!(!program_path(&target).exists());
    }

    #[test]
    fn test_atomic_write() {
        let temp = TempDir::new().unwrap();
        let test_file = temp.path().join("test.dat");

        let data = b"Hello, world!";
        write_atomic(&test_file, data).unwrap();

        let read_data = read_file(&test_file).unwrap();
        assert_eq!(data, &read_data[..]);
    }
}
