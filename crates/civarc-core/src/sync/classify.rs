//! Per-file state machine decisions.
//!
//! These functions are pure: they look at what the ledgers and the stored
//! record say about a file and return what to do next. The engine performs
//! the I/O.

use crate::archive::{ArchiveRecord, ProcessedEntry};
use crate::model_files::ContentHash;
use crate::sync::options::SyncOptions;
use chrono::{DateTime, Utc};

/// Why a file was skipped without contacting the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Listed in the missing ledger and `skip_missing` is set.
    KnownMissing,
    /// Already archived with the same content.
    AlreadyProcessed,
    /// Nothing archived yet, and the mode only works on archived files.
    NotArchived,
}

/// How to look the file up in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    ByHash,
    ByVersionId(u64),
}

/// What the engine should do with a discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Skip(SkipReason),
    /// The bundle under this name belongs to different content.
    Conflict { stored: ContentHash },
    HtmlOnly,
    Lookup(LookupKind),
}

/// Everything known about a file before any network call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFacts<'a> {
    pub in_missing: bool,
    pub processed: Option<&'a ProcessedEntry>,
    pub record: Option<&'a ArchiveRecord>,
    /// Current content hash, when it has been computed.
    pub hash: Option<&'a ContentHash>,
}

/// Whether the mode needs the file's content hash before classifying.
///
/// `only_html` renders from stored data and `only_update` reuses the stored
/// hash, so neither reads the model file.
pub fn needs_hash(options: &SyncOptions) -> bool {
    !(options.only_html || options.only_update)
}

/// Decide the next step for a file.
pub fn classify(options: &SyncOptions, facts: &FileFacts<'_>) -> Disposition {
    if options.skip_missing && options.only_new && facts.in_missing {
        return Disposition::Skip(SkipReason::KnownMissing);
    }

    if let (Some(record), Some(hash)) = (facts.record, facts.hash) {
        if &record.hash != hash {
            return Disposition::Conflict {
                stored: record.hash.clone(),
            };
        }
    }

    if options.only_new {
        let unchanged = matches!(
            (facts.processed, facts.hash),
            (Some(entry), Some(hash)) if &entry.hash == hash
        );
        // A ledger entry whose bundle is gone falls through to a lookup.
        if unchanged && facts.record.is_some() {
            return Disposition::Skip(SkipReason::AlreadyProcessed);
        }
    }

    match (facts.record, options.only_html, options.only_update) {
        (None, true, _) | (None, _, true) => Disposition::Skip(SkipReason::NotArchived),
        (Some(_), true, _) => Disposition::HtmlOnly,
        (Some(record), _, true) => Disposition::Lookup(LookupKind::ByVersionId(record.version_id)),
        _ => Disposition::Lookup(LookupKind::ByHash),
    }
}

/// Whether a catalog answer stamped `incoming` should replace the stored record.
pub fn needs_refresh(
    options: &SyncOptions,
    record: Option<&ArchiveRecord>,
    incoming: Option<DateTime<Utc>>,
) -> bool {
    match record {
        None => true,
        Some(_) if options.only_update => true,
        Some(record) => record.is_superseded_by(incoming),
    }
}
