//! Archive cleanup: duplicate models and orphaned bundles.
//!
//! Works from local state only; the catalog is never contacted and model
//! files are never touched.

use crate::archive::{ArchiveStore, DuplicateGroup, Ledgers};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::model_files::{ContentHash, ModelFile};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::{info, warn};

/// What a cleanup pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Hash groups with more than one file.
    pub duplicate_groups: usize,
    /// Paths recorded as removed duplicates.
    pub duplicate_paths: Vec<String>,
    /// Bundle directories deleted.
    pub removed_bundles: Vec<String>,
    /// Processed-ledger entries dropped.
    pub dropped_entries: Vec<String>,
    /// Files that could not be hashed, with the error.
    pub errors: Vec<(String, String)>,
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Duplicate groups:        {}", self.duplicate_groups)?;
        writeln!(f, "Duplicate files:         {}", self.duplicate_paths.len())?;
        writeln!(f, "Bundles removed:         {}", self.removed_bundles.len())?;
        writeln!(f, "Ledger entries dropped:  {}", self.dropped_entries.len())?;
        for key in &self.removed_bundles {
            writeln!(f, "  - {}", key)?;
        }
        if !self.errors.is_empty() {
            writeln!(f, "Unreadable files:")?;
            for (name, message) in &self.errors {
                writeln!(f, "  - {}: {}", name, message)?;
            }
        }
        Ok(())
    }
}

/// Remove duplicate and orphaned archive data for the discovered `files`.
///
/// Duplicates are grouped by content hash; the lexicographically first path
/// in each group is kept. Bundles that no kept file maps to are deleted, as
/// are bundles whose stored hash no longer matches any file of that name.
pub async fn clean(
    store: &ArchiveStore,
    files: &[ModelFile],
    ledgers: &mut Ledgers,
    cancel: &CancellationToken,
) -> Result<CleanReport> {
    let mut report = CleanReport::default();

    let mut by_hash: BTreeMap<ContentHash, Vec<&ModelFile>> = BTreeMap::new();
    let mut unhashed_names: BTreeSet<&str> = BTreeSet::new();
    for file in files {
        cancel.check()?;
        match file.hash().await {
            Ok(hash) => by_hash.entry(hash.clone()).or_default().push(file),
            Err(e) => {
                warn!("Cannot hash {}: {}", file.file_name(), e);
                unhashed_names.insert(file.sanitized_name());
                report.errors.push((file.file_name().to_string(), e.to_string()));
            }
        }
    }

    // Duplicates
    let mut removed_paths: BTreeSet<String> = BTreeSet::new();
    for (hash, group) in by_hash.iter_mut() {
        if group.len() < 2 {
            continue;
        }
        group.sort_by_key(|f| f.ledger_key());
        let kept = group[0];
        let removed: Vec<String> = group[1..].iter().map(|f| f.ledger_key()).collect();

        info!(
            "Duplicate content {}: keeping {}, {} duplicate(s)",
            hash.short(),
            kept.ledger_key(),
            removed.len()
        );
        ledgers.duplicates.replace(
            hash,
            DuplicateGroup {
                kept: kept.ledger_key(),
                removed: removed.clone(),
            },
        );
        report.duplicate_groups += 1;
        removed_paths.extend(removed);
    }
    report.duplicate_paths = removed_paths.iter().cloned().collect();

    // Hashes of the files that stay, by bundle name.
    let mut active: HashMap<&str, BTreeSet<&ContentHash>> = HashMap::new();
    for (hash, group) in &by_hash {
        for file in group {
            if !removed_paths.contains(&file.ledger_key()) {
                active.entry(file.sanitized_name()).or_default().insert(hash);
            }
        }
    }

    // Orphaned and stale bundles
    for key in store.bundle_keys()? {
        cancel.check()?;
        if unhashed_names.contains(key.as_str()) {
            continue;
        }
        let reason = match active.get(key.as_str()) {
            None => Some("no model file maps to it"),
            Some(hashes) => match store.stored_hash(&key) {
                Ok(Some(stored)) if !hashes.contains(&stored) => {
                    Some("archived content no longer matches")
                }
                Ok(_) => None,
                Err(e) => {
                    warn!("Cannot read stored hash of {}: {}", key, e);
                    None
                }
            },
        };
        if let Some(reason) = reason {
            info!("Removing bundle {} ({})", key, reason);
            if store.remove_bundle(&key)? {
                report.removed_bundles.push(key);
            }
        }
    }

    // Ledger entries for paths that are gone or were removed as duplicates
    let present: BTreeSet<String> = files
        .iter()
        .map(ModelFile::ledger_key)
        .filter(|key| !removed_paths.contains(key))
        .collect();
    report.dropped_entries = ledgers.processed.retain(|key| present.contains(key));

    store.save_ledgers(ledgers)?;
    info!(
        "Cleanup removed {} bundles and {} ledger entries",
        report.removed_bundles.len(),
        report.dropped_entries.len()
    );
    Ok(report)
}
