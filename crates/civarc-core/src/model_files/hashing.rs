//! Streaming SHA-256 fingerprints for model files.
//!
//! Model files routinely reach several gigabytes, so the file is read in
//! fixed-size chunks and never held in memory as a whole.

use crate::error::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Chunk size for reading files (8MB, optimal for SSDs).
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Lowercase hex SHA-256 digest of a model file's full contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ContentHash(String);

impl From<String> for ContentHash {
    fn from(hex: String) -> Self {
        Self::from_hex(hex)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl ContentHash {
    /// Wrap an already computed digest, normalizing to lowercase.
    pub fn from_hex(hex: impl AsRef<str>) -> Self {
        Self(hex.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the SHA-256 fingerprint of a file.
pub fn compute_sha256(path: impl AsRef<Path>) -> Result<ContentHash> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| ArchiveError::io_with_path(e, path))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ArchiveError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Compute the fingerprint on the blocking thread pool.
pub async fn compute_sha256_async(path: impl AsRef<Path>) -> Result<ContentHash> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || compute_sha256(&path))
        .await
        .map_err(|e| ArchiveError::Other(format!("Hash computation task failed: {}", e)))?
}
