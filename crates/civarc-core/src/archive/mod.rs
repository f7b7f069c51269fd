//! Local archive: per-model bundles and corpus-wide ledgers.
//!
//! All writes go through [`atomic`], so an interrupted run never leaves a
//! half-written file in place of a good one.

pub mod atomic;
mod ledger;
mod record;
mod store;

pub use ledger::{
    DuplicateGroup, DuplicateLedger, Ledgers, MissingEntry, MissingLedger, ProcessedEntry,
    ProcessedLedger,
};
pub use record::{ArchiveRecord, AssetDescriptor, AssetKind, Bundle, HashFile};
pub use store::{ArchiveStore, StoredAsset};
