//! Incremental synchronization of model files against the catalog.
//!
//! For every discovered file the engine:
//! 1. Classifies it from ledgers, stored record and flags ([`classify`])
//! 2. Looks it up in the catalog when needed, with retries
//! 3. Decides whether the stored record is current ([`needs_refresh`])
//! 4. Downloads previews, writes the bundle and renders its page
//! 5. Updates the ledgers and flushes them
//!
//! [`clean`] is the separate cleanup pass for duplicates and orphans.

mod classify;
mod clean;
mod engine;
mod options;
mod pacing;
mod report;

pub use classify::{
    classify, needs_hash, needs_refresh, Disposition, FileFacts, LookupKind, SkipReason,
};
pub use clean::{clean, CleanReport};
pub use engine::SyncEngine;
pub use options::{ImagePolicy, SyncOptions};
pub use pacing::{pacer_for, NoPacing, Pacer, RandomPacing};
pub use report::{Outcome, SyncReport};
