//! Atomic file writes for the archive.
//!
//! Every archive file is written by:
//! 1. Writing to a sibling temp file with a PID+TID suffix
//! 2. Syncing it to disk
//! 3. Renaming it over the target
//!
//! A reader therefore sees either the old file or the new one, never a mix.

use crate::error::{ArchiveError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;
use tracing::debug;

const TEMP_EXTENSION: &str = "tmp";

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ArchiveError::io_with_path(e, path)),
    };

    let data = serde_json::from_str(&contents).map_err(|e| ArchiveError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;
    Ok(Some(data))
}

/// Serialize `data` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(data).map_err(|e| ArchiveError::Json {
        message: format!("Failed to serialize {}: {}", path.display(), e),
        source: Some(e),
    })?;
    atomic_write_bytes(path, serialized.as_bytes())
}

/// Write raw bytes atomically, creating parent directories as needed.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ArchiveError::io_with_path(e, parent))?;
    }

    let temp_path = temp_path_for(path);
    let written = write_and_sync(&temp_path, bytes).and_then(|_| {
        fs::rename(&temp_path, path).map_err(|e| ArchiveError::Io {
            message: format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })
    });

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Whether `name` is a leftover temp file from an interrupted write.
pub fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(&format!(".{}", TEMP_EXTENSION))
}

fn write_and_sync(temp_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| ArchiveError::io_with_path(e, temp_path))?;

    file.write_all(bytes)
        .map_err(|e| ArchiveError::io_with_path(e, temp_path))?;
    file.sync_all()
        .map_err(|e| ArchiveError::io_with_path(e, temp_path))?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{}.{}.{}.{}",
        name,
        process::id(),
        thread_id(),
        TEMP_EXTENSION
    ))
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", thread::current().id()).hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_atomic_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.json");
        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        atomic_write_json(&path, &data).unwrap();
        let read_data: Option<TestData> = atomic_read_json(&path).unwrap();
        assert_eq!(read_data, Some(data));
    }

    #[test]
    fn test_atomic_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let result: Option<TestData> =
            atomic_read_json(&temp_dir.path().join("missing.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("out.txt");

        atomic_write_bytes(&path, b"one").unwrap();
        atomic_write_bytes(&path, b"two").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_temp_file_detection() {
        let temp = temp_path_for(Path::new("/out/m/m_archive.json"));
        let name = temp.file_name().unwrap().to_str().unwrap();
        assert!(is_temp_file(name));
        assert!(!is_temp_file("m_archive.json"));
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();

        let result: Result<Option<TestData>> = atomic_read_json(&path);
        assert!(matches!(result, Err(ArchiveError::Json { .. })));
    }
}
