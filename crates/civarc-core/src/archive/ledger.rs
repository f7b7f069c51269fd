//! Corpus-wide ledgers: processed files, catalog misses and duplicates.
//!
//! Each ledger tracks whether it changed since it was loaded, and
//! [`Ledgers::save`] only rewrites the files that did. A run that changes
//! nothing leaves every ledger file untouched.

use crate::archive::atomic::{atomic_read_json, atomic_write_bytes, atomic_write_json};
use crate::config::PathsConfig;
use crate::error::{ArchiveError, Result};
use crate::model_files::ContentHash;
use chrono::{DateTime, Local, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const MISSING_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MISSING_HEADER: &[&str] = &[
    "# Files not found on Civitai",
    "# Format: Timestamp | Status Code | Filename",
    "# This file is automatically updated when the script runs",
    "# A file is removed from this list when it becomes available again",
];

const DUPLICATE_HEADER: &[&str] = &[
    "# Duplicate models found in input directory",
    "# Format: Hash | Kept Model | Removed Duplicates",
    "# This file is automatically updated when running --clean",
];

/// A successfully processed model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub hash: ContentHash,
    pub sanitized_name: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProcessedFile {
    files: BTreeMap<String, ProcessedEntry>,
    /// Paths carried over from a path-list ledger, not yet confirmed by hash.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    unverified: BTreeSet<String>,
}

/// On-disk shapes of `processed_files.json`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredProcessed {
    Current(ProcessedFile),
    /// `{"files": [<path>, ...], "last_update": ...}` written by older archivers.
    PathList { files: Vec<String> },
}

/// Model paths that have been archived, keyed by absolute `/`-separated path.
///
/// Paths loaded from a path-list ledger carry no hash. They are kept as
/// unverified until a sync records them again, and never count as processed.
#[derive(Debug, Default)]
pub struct ProcessedLedger {
    entries: BTreeMap<String, ProcessedEntry>,
    unverified: BTreeSet<String>,
    dirty: bool,
}

impl ProcessedLedger {
    pub fn get(&self, path_key: &str) -> Option<&ProcessedEntry> {
        self.entries.get(path_key)
    }

    /// Whether `path_key` is only known from a path-list ledger.
    pub fn is_unverified(&self, path_key: &str) -> bool {
        self.unverified.contains(path_key)
    }

    pub fn unverified_len(&self) -> usize {
        self.unverified.len()
    }

    /// Add or update the entry for `path_key`.
    ///
    /// An entry that already holds the same hash and name is left alone,
    /// timestamp included. Returns whether anything changed.
    pub fn record(&mut self, path_key: &str, hash: &ContentHash, sanitized_name: &str) -> bool {
        let was_unverified = self.unverified.remove(path_key);
        if was_unverified {
            self.dirty = true;
        }
        if let Some(existing) = self.entries.get(path_key) {
            if &existing.hash == hash && existing.sanitized_name == sanitized_name {
                return was_unverified;
            }
        }
        self.entries.insert(
            path_key.to_string(),
            ProcessedEntry {
                hash: hash.clone(),
                sanitized_name: sanitized_name.to_string(),
                processed_at: Utc::now(),
            },
        );
        self.dirty = true;
        true
    }

    pub fn remove(&mut self, path_key: &str) -> Option<ProcessedEntry> {
        let removed = self.entries.remove(path_key);
        if removed.is_some() | self.unverified.remove(path_key) {
            self.dirty = true;
        }
        removed
    }

    /// Keep only paths for which `keep` returns true, unverified ones
    /// included. Returns the removed keys.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let mut removed: Vec<String> = self
            .entries
            .keys()
            .chain(self.unverified.iter())
            .filter(|key| !keep(key))
            .cloned()
            .collect();
        removed.sort();
        removed.dedup();
        for key in &removed {
            self.entries.remove(key);
            self.unverified.remove(key);
        }
        if !removed.is_empty() {
            self.dirty = true;
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProcessedEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn load(path: &Path) -> Result<Self> {
        let ledger = match atomic_read_json::<StoredProcessed>(path)? {
            None => Self::default(),
            Some(StoredProcessed::Current(file)) => Self {
                entries: file.files,
                unverified: file.unverified,
                dirty: false,
            },
            Some(StoredProcessed::PathList { files }) => {
                info!(
                    "{} lists {} paths without hashes; they will be re-checked",
                    path.display(),
                    files.len()
                );
                Self {
                    entries: BTreeMap::new(),
                    unverified: files
                        .iter()
                        .map(|f| f.replace('\\', "/"))
                        .collect(),
                    dirty: false,
                }
            }
        };
        Ok(ledger)
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        atomic_write_json(
            path,
            &ProcessedFile {
                files: self.entries.clone(),
                unverified: self.unverified.clone(),
            },
        )?;
        self.dirty = false;
        Ok(())
    }
}

/// A file the catalog does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry {
    pub timestamp: NaiveDateTime,
    pub status: u16,
    pub filename: String,
}

impl MissingEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, " | ");
        let timestamp =
            NaiveDateTime::parse_from_str(parts.next()?.trim(), MISSING_TIMESTAMP_FORMAT).ok()?;
        let status = parts
            .next()?
            .trim()
            .strip_prefix("Status ")?
            .trim()
            .parse()
            .ok()?;
        let filename = parts.next()?.trim().to_string();
        if filename.is_empty() {
            return None;
        }
        Some(Self {
            timestamp,
            status,
            filename,
        })
    }

    fn render(&self) -> String {
        format!(
            "{} | Status {} | {}",
            self.timestamp.format(MISSING_TIMESTAMP_FORMAT),
            self.status,
            self.filename
        )
    }
}

/// Files the catalog answered "not found" for, at most one entry per file name.
#[derive(Debug, Default)]
pub struct MissingLedger {
    entries: Vec<MissingEntry>,
    dirty: bool,
}

impl MissingLedger {
    pub fn contains(&self, filename: &str) -> bool {
        self.entries.iter().any(|e| e.filename == filename)
    }

    pub fn get(&self, filename: &str) -> Option<&MissingEntry> {
        self.entries.iter().find(|e| e.filename == filename)
    }

    /// Record a miss for `filename`.
    ///
    /// An existing entry with the same status keeps its original timestamp.
    pub fn upsert(&mut self, filename: &str, status: u16) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.filename == filename) {
            if existing.status == status {
                return false;
            }
            existing.status = status;
            existing.timestamp = now_to_seconds();
        } else {
            self.entries.push(MissingEntry {
                timestamp: now_to_seconds(),
                status,
                filename: filename.to_string(),
            });
        }
        self.dirty = true;
        true
    }

    /// Drop the entry for `filename`. Returns whether one existed.
    pub fn resolve(&mut self, filename: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.filename != filename);
        let removed = self.entries.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<&MissingEntry> {
        let mut sorted: Vec<&MissingEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        sorted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parse(text: &str) -> Self {
        let mut ledger = Self::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match MissingEntry::parse(line) {
                Some(entry) if !ledger.contains(&entry.filename) => ledger.entries.push(entry),
                Some(entry) => debug!("Dropping repeated missing entry for {}", entry.filename),
                None => warn!("Ignoring malformed missing-ledger line: {}", line),
            }
        }
        ledger
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in MISSING_HEADER {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        for entry in self.entries() {
            out.push_str(&entry.render());
            out.push('\n');
        }
        out
    }

    fn load(path: &Path) -> Result<Self> {
        match read_optional_text(path)? {
            Some(text) => Ok(Self::parse(&text)),
            None => Ok(Self::default()),
        }
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.entries.is_empty() {
            remove_if_exists(path)?;
            info!("All models are now available in the catalog; removed {}", path.display());
        } else {
            atomic_write_bytes(path, self.render().as_bytes())?;
        }
        self.dirty = false;
        Ok(())
    }
}

/// Files sharing one content hash, as resolved by the cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub kept: String,
    pub removed: Vec<String>,
}

/// Duplicate groups keyed by content hash.
#[derive(Debug, Default)]
pub struct DuplicateLedger {
    groups: BTreeMap<String, DuplicateGroup>,
    dirty: bool,
}

impl DuplicateLedger {
    pub fn get(&self, hash: &ContentHash) -> Option<&DuplicateGroup> {
        self.groups.get(hash.as_str())
    }

    /// Replace the group for `hash`. Returns whether anything changed.
    pub fn replace(&mut self, hash: &ContentHash, group: DuplicateGroup) -> bool {
        if self.groups.get(hash.as_str()) == Some(&group) {
            return false;
        }
        self.groups.insert(hash.to_string(), group);
        self.dirty = true;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DuplicateGroup)> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn parse(text: &str) -> Self {
        let mut ledger = Self::default();
        let mut current: Option<(String, DuplicateGroup)> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('#') {
                continue;
            }
            if let Some(hash) = trimmed.strip_prefix("Hash:") {
                if let Some((hash, group)) = current.take() {
                    ledger.groups.insert(hash, group);
                }
                current = Some((
                    ContentHash::from_hex(hash).to_string(),
                    DuplicateGroup {
                        kept: String::new(),
                        removed: Vec::new(),
                    },
                ));
            } else if let Some(kept) = trimmed.strip_prefix("Kept:") {
                if let Some((_, group)) = current.as_mut() {
                    group.kept = kept.trim().to_string();
                }
            } else if let Some(removed) = trimmed.strip_prefix("- ") {
                if let Some((_, group)) = current.as_mut() {
                    group.removed.push(removed.trim().to_string());
                }
            } else if !trimmed.is_empty() && trimmed != "Removed:" {
                warn!("Ignoring malformed duplicate-ledger line: {}", trimmed);
            }
        }
        if let Some((hash, group)) = current.take() {
            ledger.groups.insert(hash, group);
        }
        ledger
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in DUPLICATE_HEADER {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        for (hash, group) in &self.groups {
            out.push_str(&format!("Hash: {}\nKept: {}\nRemoved:\n", hash, group.kept));
            for path in &group.removed {
                out.push_str(&format!("  - {}\n", path));
            }
            out.push('\n');
        }
        out
    }

    fn load(path: &Path) -> Result<Self> {
        match read_optional_text(path)? {
            Some(text) => Ok(Self::parse(&text)),
            None => Ok(Self::default()),
        }
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if self.groups.is_empty() {
            remove_if_exists(path)?;
        } else {
            atomic_write_bytes(path, self.render().as_bytes())?;
        }
        self.dirty = false;
        Ok(())
    }
}

/// All corpus-wide ledgers, loaded and saved together.
#[derive(Debug, Default)]
pub struct Ledgers {
    pub processed: ProcessedLedger,
    pub missing: MissingLedger,
    pub duplicates: DuplicateLedger,
}

impl Ledgers {
    /// Load every ledger from `root`; absent files yield empty ledgers.
    pub fn load(root: &Path) -> Result<Self> {
        Ok(Self {
            processed: ProcessedLedger::load(&root.join(PathsConfig::PROCESSED_LEDGER_NAME))?,
            missing: MissingLedger::load(&root.join(PathsConfig::MISSING_LEDGER_NAME))?,
            duplicates: DuplicateLedger::load(&root.join(PathsConfig::DUPLICATE_LEDGER_NAME))?,
        })
    }

    /// Write the ledgers that changed since the last load or save.
    pub fn save(&mut self, root: &Path) -> Result<()> {
        self.processed
            .save(&root.join(PathsConfig::PROCESSED_LEDGER_NAME))?;
        self.missing
            .save(&root.join(PathsConfig::MISSING_LEDGER_NAME))?;
        self.duplicates
            .save(&root.join(PathsConfig::DUPLICATE_LEDGER_NAME))?;
        Ok(())
    }

    /// Whether any ledger has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.processed.dirty || self.missing.dirty || self.duplicates.dirty
    }
}

fn now_to_seconds() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

fn read_optional_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ArchiveError::io_with_path(e, path)),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ArchiveError::io_with_path(e, path)),
    }
}
