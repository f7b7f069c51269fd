//! Error types for the civarc archiver.
//!
//! Errors fall into three groups that the sync engine treats differently:
//! - remote and retryable (network failures, timeouts, 408/429/5xx, malformed payloads)
//! - local and recoverable (unreadable model files, disk errors, corrupt bundles)
//! - run-level fatal (bad input path, unwritable output, invalid configuration)
//!
//! A catalog "not found" answer is not an error at all; see
//! [`crate::catalog::LookupOutcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the archiver.
#[derive(Debug, Error)]
pub enum ArchiveError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout: {url}")]
    Timeout { url: String },

    #[error("Catalog returned HTTP {status} for {url}")]
    CatalogStatus { url: String, status: u16 },

    #[error("Malformed catalog payload from {url}: {message}")]
    MalformedPayload { url: String, message: String },

    #[error("Download failed for {url} (HTTP {status})")]
    DownloadFailed { url: String, status: u16 },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Input path does not exist: {0}")]
    InputNotFound(PathBuf),

    #[error("Output directory is not writable: {path}: {message}")]
    OutputNotWritable { path: PathBuf, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Malformed SafeTensors header in {path}: {message}")]
    MalformedHeader { path: PathBuf, message: String },

    // Archive consistency errors
    #[error("Bundle '{key}' already holds hash {stored}, refusing to overwrite with {incoming}")]
    BundleConflict {
        key: String,
        stored: String,
        incoming: String,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Run cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for archiver operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        ArchiveError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ArchiveError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiveError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Map a reqwest failure for `url`, separating timeouts from other
    /// transport errors.
    pub fn from_request(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            ArchiveError::Timeout {
                url: url.to_string(),
            }
        } else {
            ArchiveError::Network {
                message: format!("GET {} failed: {}", url, err),
                source: Some(err),
            }
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArchiveError::Network { .. }
            | ArchiveError::Timeout { .. }
            | ArchiveError::MalformedPayload { .. } => true,
            ArchiveError::CatalogStatus { status, .. }
            | ArchiveError::DownloadFailed { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Check if this error ends the whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveError::InputNotFound(_)
                | ArchiveError::OutputNotWritable { .. }
                | ArchiveError::Config { .. }
        )
    }
}

/// HTTP statuses worth retrying after a pause.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}
