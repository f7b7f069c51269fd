//! Local model files: discovery, naming and fingerprints.
//!
//! - [`hashing`] - streaming SHA-256 content hashes
//! - [`naming`] - bundle-name sanitization
//! - [`safetensors`] - header metadata reader

pub mod hashing;
pub mod naming;
pub mod safetensors;

pub use hashing::{compute_sha256, compute_sha256_async, ContentHash};
pub use naming::sanitize_name;
pub use safetensors::read_header_metadata;

use crate::config::PathsConfig;
use crate::error::{ArchiveError, Result};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A model file discovered on disk.
///
/// The content hash is computed on first use and cached for the rest of the run.
#[derive(Debug)]
pub struct ModelFile {
    path: PathBuf,
    file_name: String,
    sanitized_name: String,
    hash: OnceCell<ContentHash>,
}

impl ModelFile {
    /// Describe the model file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())
            .map_err(|e| ArchiveError::io_with_path(e, path.as_ref()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ArchiveError::Other(format!("{} has no file name", path.display())))?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            sanitized_name: sanitize_name(&stem),
            file_name,
            path,
            hash: OnceCell::new(),
        })
    }

    /// Absolute path to the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name including extension, as shown to the user.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Bundle key derived from the file stem.
    pub fn sanitized_name(&self) -> &str {
        &self.sanitized_name
    }

    /// Key used by the processed ledger: the absolute path with `/` separators.
    pub fn ledger_key(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }

    /// Content hash, computing it on first call.
    pub async fn hash(&self) -> Result<&ContentHash> {
        self.hash
            .get_or_try_init(|| async {
                debug!("Hashing {}", self.path.display());
                compute_sha256_async(&self.path).await
            })
            .await
    }

    /// Content hash if it has already been computed or seeded.
    pub fn cached_hash(&self) -> Option<&ContentHash> {
        self.hash.get()
    }

    /// Seed the hash from a trusted earlier computation.
    ///
    /// Has no effect if the hash is already known.
    pub fn seed_hash(&self, hash: ContentHash) {
        let _ = self.hash.set(hash);
    }
}

fn has_model_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(PathsConfig::MODEL_EXTENSION))
        .unwrap_or(false)
}

/// Resolve the input path into the set of model files to process.
///
/// A file path yields itself; a directory is scanned recursively. Results are
/// sorted by path so runs are reproducible.
pub fn discover(input: &Path) -> Result<Vec<ModelFile>> {
    if !input.exists() {
        return Err(ArchiveError::InputNotFound(input.to_path_buf()));
    }

    if input.is_file() {
        if !has_model_extension(input) {
            return Err(ArchiveError::Config {
                message: format!("{} is not a .safetensors file", input.display()),
            });
        }
        return Ok(vec![ModelFile::new(input)?]);
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(input).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", input.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file() && has_model_extension(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let files = paths
        .iter()
        .map(ModelFile::new)
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Found {} .{} files in {}",
        files.len(),
        PathsConfig::MODEL_EXTENSION,
        input.display()
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("sub/deeper")).unwrap();
        std::fs::write(root.join("b.safetensors"), b"b").unwrap();
        std::fs::write(root.join("sub/deeper/a.SAFETENSORS"), b"a").unwrap();
        std::fs::write(root.join("notes.txt"), b"x").unwrap();

        let files = discover(root).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.file_name().to_string()).collect();
        assert_eq!(names, vec!["b.safetensors", "a.SAFETENSORS"]);
    }

    #[test]
    fn test_discover_missing_input() {
        let result = discover(Path::new("/no/such/dir"));
        assert!(matches!(result, Err(ArchiveError::InputNotFound(_))));
    }

    #[test]
    fn test_discover_single_file_requires_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.ckpt");
        std::fs::write(&path, b"x").unwrap();

        assert!(matches!(discover(&path), Err(ArchiveError::Config { .. })));
    }

    #[test]
    fn test_model_file_names() {
        let file = ModelFile::new("/models/Cool Style (v1.5).safetensors").unwrap();
        assert_eq!(file.file_name(), "Cool Style (v1.5).safetensors");
        assert_eq!(file.sanitized_name(), "Cool_Style_v1_5");
        assert!(file.ledger_key().ends_with("Cool Style (v1.5).safetensors"));
    }

    #[tokio::test]
    async fn test_hash_is_cached() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.safetensors");
        std::fs::write(&path, b"first").unwrap();

        let file = ModelFile::new(&path).unwrap();
        let first = file.hash().await.unwrap().clone();

        std::fs::write(&path, b"second").unwrap();
        assert_eq!(file.hash().await.unwrap(), &first);
        assert_eq!(file.cached_hash(), Some(&first));
    }
}
