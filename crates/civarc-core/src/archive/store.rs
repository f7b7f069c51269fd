//! On-disk archive layout.
//!
//! ```text
//! <root>/
//!   processed_files.json, missing_from_civitai.txt, duplicate_models.txt, index.html
//!   <name>/
//!     <name>_civitai_model_version.json
//!     <name>_civitai_model.json
//!     <name>_metadata.json
//!     <name>_hash.json
//!     <name>_preview_<i>.<ext> + <name>_preview_<i>.json
//!     <name>.html
//!     <name>_archive.json          (manifest, written last)
//! ```

use crate::archive::atomic::{atomic_read_json, atomic_write_bytes, atomic_write_json, is_temp_file};
use crate::archive::ledger::Ledgers;
use crate::archive::record::{ArchiveRecord, Bundle, HashFile};
use crate::catalog::CatalogImage;
use crate::config::{NetworkConfig, PathsConfig};
use crate::error::{ArchiveError, Result};
use crate::model_files::ContentHash;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A preview asset file found in a bundle directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub ordinal: usize,
    pub path: PathBuf,
    /// The JSON sidecar, when one has been written.
    pub sidecar: Option<PathBuf>,
}

/// Reads and writes bundles and ledgers under one output directory.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the output directory and prove that it accepts writes.
    pub fn ensure_writable(&self) -> Result<()> {
        let not_writable = |e: std::io::Error| ArchiveError::OutputNotWritable {
            path: self.root.clone(),
            message: e.to_string(),
        };

        fs::create_dir_all(&self.root).map_err(not_writable)?;
        let probe = self.root.join(format!(".civarc-probe-{}", std::process::id()));
        fs::write(&probe, b"").map_err(not_writable)?;
        fs::remove_file(&probe).map_err(not_writable)?;
        Ok(())
    }

    pub fn bundle_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn bundle_file(&self, key: &str, suffix: &str) -> PathBuf {
        self.bundle_dir(key).join(format!("{}{}", key, suffix))
    }

    pub fn record_path(&self, key: &str) -> PathBuf {
        self.bundle_file(key, PathsConfig::RECORD_SUFFIX)
    }

    pub fn page_path(&self, key: &str) -> PathBuf {
        self.bundle_file(key, PathsConfig::PAGE_SUFFIX)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(PathsConfig::INDEX_PAGE_NAME)
    }

    /// Path for preview asset `ordinal` with extension `ext` (including the dot).
    pub fn asset_path(&self, key: &str, ordinal: usize, ext: &str) -> PathBuf {
        self.bundle_dir(key)
            .join(format!("{}{}{}{}", key, PathsConfig::PREVIEW_INFIX, ordinal, ext))
    }

    /// Load the bundle manifest. A bundle without one is absent.
    pub fn load(&self, key: &str) -> Result<Option<ArchiveRecord>> {
        atomic_read_json(&self.record_path(key))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.record_path(key).is_file()
    }

    /// Raw catalog version payload stored for `key`.
    pub fn load_version_payload(&self, key: &str) -> Result<Option<Value>> {
        atomic_read_json(&self.bundle_file(key, PathsConfig::VERSION_SUFFIX))
    }

    /// Raw catalog model payload stored for `key`.
    pub fn load_model_payload(&self, key: &str) -> Result<Option<Value>> {
        atomic_read_json(&self.bundle_file(key, PathsConfig::MODEL_SUFFIX))
    }

    /// Hash the bundle was archived for.
    ///
    /// Falls back to `<name>_hash.json` for bundles written before manifests
    /// existed.
    pub fn stored_hash(&self, key: &str) -> Result<Option<ContentHash>> {
        if let Some(record) = self.load(key)? {
            return Ok(Some(record.hash));
        }
        let hash_file: Option<HashFile> =
            atomic_read_json(&self.bundle_file(key, PathsConfig::HASH_SUFFIX))?;
        Ok(hash_file.map(|h| ContentHash::from_hex(h.hash_value)))
    }

    /// Write every file of a bundle, the manifest last.
    ///
    /// Refuses to replace a bundle that was archived for different content.
    pub fn save(&self, key: &str, bundle: &Bundle) -> Result<()> {
        if let Some(existing) = self.load(key)? {
            if existing.hash != bundle.record.hash {
                return Err(ArchiveError::BundleConflict {
                    key: key.to_string(),
                    stored: existing.hash.to_string(),
                    incoming: bundle.record.hash.to_string(),
                });
            }
        }

        atomic_write_json(&self.bundle_file(key, PathsConfig::VERSION_SUFFIX), &bundle.version)?;
        if let Some(ref model) = bundle.model {
            atomic_write_json(&self.bundle_file(key, PathsConfig::MODEL_SUFFIX), model)?;
        }
        atomic_write_json(
            &self.bundle_file(key, PathsConfig::METADATA_SUFFIX),
            &bundle.record.metadata,
        )?;
        atomic_write_json(
            &self.bundle_file(key, PathsConfig::HASH_SUFFIX),
            &HashFile::sha256(&bundle.record.hash, &bundle.record.file_name),
        )?;
        atomic_write_json(&self.record_path(key), &bundle.record)?;

        debug!("Saved bundle {}", key);
        Ok(())
    }

    /// Write the sidecar JSON for a downloaded asset.
    pub fn add_asset(&self, asset_path: &Path, image: &CatalogImage) -> Result<()> {
        atomic_write_json(&asset_path.with_extension("json"), image)
    }

    /// Iterate the preview assets present in a bundle directory.
    ///
    /// Entries are read lazily; in-progress downloads and sidecars are skipped.
    pub fn list_assets(&self, key: &str) -> Result<impl Iterator<Item = StoredAsset>> {
        let dir = self.bundle_dir(key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(ArchiveError::io_with_path(e, dir)),
        };
        let prefix = format!("{}{}", key, PathsConfig::PREVIEW_INFIX);

        Ok(entries
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .filter_map(move |entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                parse_asset_name(&name, &prefix).map(|ordinal| {
                    let path = entry.path();
                    let sidecar = path.with_extension("json");
                    StoredAsset {
                        ordinal,
                        sidecar: sidecar.is_file().then_some(sidecar),
                        path,
                    }
                })
            }))
    }

    /// Delete a bundle directory. Returns whether it existed.
    pub fn remove_bundle(&self, key: &str) -> Result<bool> {
        let dir = self.bundle_dir(key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("Removed bundle {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ArchiveError::io_with_path(e, dir)),
        }
    }

    /// Names of all bundle directories, sorted.
    pub fn bundle_keys(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io_with_path(e, &self.root)),
        };

        let mut keys: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Rebuild asset sidecars from the archived version payloads.
    ///
    /// Only assets whose preview file exists get a sidecar. Returns the number
    /// of sidecars written.
    pub fn regenerate_asset_sidecars(&self) -> Result<usize> {
        let mut written = 0;
        for key in self.bundle_keys()? {
            let version = match self.load_version_payload(&key) {
                Ok(Some(version)) => version,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping {}: {}", key, e);
                    continue;
                }
            };
            let images = version
                .get("images")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for asset in self.list_assets(&key)? {
                let Some(raw) = images.get(asset.ordinal) else {
                    continue;
                };
                match serde_json::from_value::<CatalogImage>(raw.clone()) {
                    Ok(image) => {
                        self.add_asset(&asset.path, &image)?;
                        written += 1;
                    }
                    Err(e) => warn!("Image {} of {} is malformed: {}", asset.ordinal, key, e),
                }
            }
        }
        info!("Generated {} preview sidecar files", written);
        Ok(written)
    }

    /// Write a model page unless it already has exactly this content.
    pub fn write_page(&self, key: &str, html: &str) -> Result<bool> {
        write_if_changed(&self.page_path(key), html)
    }

    /// Write the corpus index page unless it already has exactly this content.
    pub fn write_index(&self, html: &str) -> Result<bool> {
        write_if_changed(&self.index_path(), html)
    }

    pub fn load_ledgers(&self) -> Result<Ledgers> {
        Ledgers::load(&self.root)
    }

    pub fn save_ledgers(&self, ledgers: &mut Ledgers) -> Result<()> {
        ledgers.save(&self.root)
    }
}

/// Ordinal of a `<key>_preview_<n>.<ext>` asset file, if `name` is one.
fn parse_asset_name(name: &str, prefix: &str) -> Option<usize> {
    if is_temp_file(name) || name.ends_with(NetworkConfig::DOWNLOAD_TEMP_SUFFIX) {
        return None;
    }
    let rest = name.strip_prefix(prefix)?;
    let (ordinal, ext) = rest.split_once('.')?;
    if ext.eq_ignore_ascii_case("json") {
        return None;
    }
    ordinal.parse().ok()
}

fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if let Ok(existing) = fs::read(path) {
        if existing == contents.as_bytes() {
            return Ok(false);
        }
    }
    atomic_write_bytes(path, contents.as_bytes())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::record::{AssetDescriptor, AssetKind};
    use chrono::Utc;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn bundle(hash: &str) -> Bundle {
        Bundle {
            record: ArchiveRecord {
                hash: ContentHash::from_hex(hash),
                file_name: "m.safetensors".into(),
                model_id: 7,
                version_id: 11,
                updated_at: None,
                assets: vec![AssetDescriptor {
                    url: "https://i.test/1.jpeg".into(),
                    filename: "m_preview_0.jpeg".into(),
                    ordinal: 0,
                    kind: AssetKind::Image,
                }],
                metadata: Map::new(),
                archived_at: Utc::now(),
            },
            version: json!({"id": 11, "modelId": 7, "images": [{"url": "https://i.test/1.jpeg"}]}),
            model: Some(json!({"id": 7, "name": "M"})),
        }
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());

        assert!(store.load("m").unwrap().is_none());
        store.save("m", &bundle("aa")).unwrap();

        let record = store.load("m").unwrap().unwrap();
        assert_eq!(record.version_id, 11);
        assert!(store.exists("m"));
        assert!(store.bundle_dir("m").join("m_civitai_model.json").exists());
        assert!(store.bundle_dir("m").join("m_hash.json").exists());
        assert_eq!(store.stored_hash("m").unwrap(), Some(ContentHash::from_hex("aa")));
    }

    #[test]
    fn test_payload_without_manifest_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());
        let dir = store.bundle_dir("m");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("m_civitai_model_version.json"), "{}").unwrap();

        assert!(store.load("m").unwrap().is_none());
        assert!(!store.exists("m"));
    }

    #[test]
    fn test_save_refuses_hash_change() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());
        store.save("m", &bundle("aa")).unwrap();

        let result = store.save("m", &bundle("bb"));
        assert!(matches!(result, Err(ArchiveError::BundleConflict { .. })));
        assert_eq!(store.load("m").unwrap().unwrap().hash, ContentHash::from_hex("aa"));
    }

    #[test]
    fn test_list_assets_skips_partials_and_sidecars() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());
        let dir = store.bundle_dir("m");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("m_preview_0.jpeg"), b"x").unwrap();
        fs::write(dir.join("m_preview_0.json"), b"{}").unwrap();
        fs::write(dir.join("m_preview_1.mp4.part"), b"x").unwrap();
        fs::write(dir.join("m_preview_2.mp4"), b"x").unwrap();

        let mut assets: Vec<StoredAsset> = store.list_assets("m").unwrap().collect();
        assets.sort_by_key(|a| a.ordinal);
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].ordinal, 0);
        assert!(assets[0].sidecar.is_some());
        assert_eq!(assets[1].ordinal, 2);
        assert!(assets[1].sidecar.is_none());

        assert_eq!(store.list_assets("absent").unwrap().count(), 0);
    }

    #[test]
    fn test_regenerate_sidecars() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());
        store.save("m", &bundle("aa")).unwrap();
        fs::write(store.asset_path("m", 0, ".jpeg"), b"img").unwrap();

        assert_eq!(store.regenerate_asset_sidecars().unwrap(), 1);
        let sidecar: Value =
            serde_json::from_str(&fs::read_to_string(store.bundle_dir("m").join("m_preview_0.json")).unwrap())
                .unwrap();
        assert_eq!(sidecar["url"], "https://i.test/1.jpeg");
    }

    #[test]
    fn test_remove_bundle_and_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());
        store.save("b", &bundle("bb")).unwrap();
        store.save("a", &bundle("aa")).unwrap();

        assert_eq!(store.bundle_keys().unwrap(), vec!["a", "b"]);
        assert!(store.remove_bundle("a").unwrap());
        assert!(!store.remove_bundle("a").unwrap());
        assert_eq!(store.bundle_keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_write_page_only_when_changed() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());

        assert!(store.write_page("m", "<p>a</p>").unwrap());
        assert!(!store.write_page("m", "<p>a</p>").unwrap());
        assert!(store.write_page("m", "<p>b</p>").unwrap());
    }

    #[test]
    fn test_ensure_writable_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path().join("out"));
        store.ensure_writable().unwrap();
        assert!(store.root().is_dir());
        assert_eq!(fs::read_dir(store.root()).unwrap().count(), 0);
    }
}
