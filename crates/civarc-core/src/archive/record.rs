//! Persisted per-model records.

use crate::model_files::ContentHash;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Media kind of a preview asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
}

/// A preview asset stored in a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Full-size URL the asset was fetched from.
    pub url: String,
    /// File name inside the bundle directory.
    pub filename: String,
    /// Position in the catalog's image list.
    pub ordinal: usize,
    pub kind: AssetKind,
}

/// The archived state of one model, stored as the bundle manifest.
///
/// The manifest is written after every other bundle file, so its presence
/// means the bundle is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub hash: ContentHash,
    pub file_name: String,
    pub model_id: u64,
    pub version_id: u64,
    /// Catalog-side `updatedAt` of the version at the time it was archived.
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
    /// SafeTensors `__metadata__` of the archived file.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    /// Whether a catalog version stamped `incoming` should replace this record.
    ///
    /// Only a strictly newer timestamp replaces a stored one. A record with no
    /// timestamp is replaced by any timestamped version; a catalog answer
    /// without a timestamp never replaces anything.
    pub fn is_superseded_by(&self, incoming: Option<DateTime<Utc>>) -> bool {
        match (self.updated_at, incoming) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(stored), Some(incoming)) => incoming > stored,
        }
    }
}

/// Contents of `<name>_hash.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashFile {
    pub hash_type: String,
    pub hash_value: String,
    pub filename: String,
    pub timestamp: String,
}

impl HashFile {
    pub fn sha256(hash: &ContentHash, filename: &str) -> Self {
        Self {
            hash_type: "SHA256".to_string(),
            hash_value: hash.to_string(),
            filename: filename.to_string(),
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        }
    }
}

/// Everything written for one model in a single save.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub record: ArchiveRecord,
    /// Raw catalog version payload.
    pub version: Value,
    /// Raw catalog model payload, if the model lookup succeeded.
    pub model: Option<Value>,
}
