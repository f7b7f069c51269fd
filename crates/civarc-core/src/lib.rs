//! civarc core - archives catalog metadata for local SafeTensors models.
//!
//! For every `.safetensors` file under an input path the library computes a
//! content hash, looks the file up in a Civitai-shaped catalog, and keeps a
//! local bundle of the catalog data, preview assets and a browsable page.
//! Repeated runs are incremental: only new or updated models cause writes.
//!
//! # Example
//!
//! ```rust,no_run
//! use civarc_core::{
//!     discover, ArchiveStore, CancellationToken, CatalogClient, HttpAssetFetcher, SyncEngine,
//!     SyncOptions,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> civarc_core::Result<()> {
//!     let files = discover(Path::new("/models"))?;
//!     let store = ArchiveStore::new("/archive");
//!     store.ensure_writable()?;
//!
//!     let engine = SyncEngine::new(
//!         CatalogClient::new("https://civitai.com/api/v1", None)?,
//!         HttpAssetFetcher::new(None)?,
//!         store.clone(),
//!         SyncOptions::default(),
//!     );
//!     let (report, _ledgers) = engine
//!         .run(&files, store.load_ledgers()?, &CancellationToken::new())
//!         .await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model_files;
pub mod network;
pub mod render;
pub mod sync;

pub use archive::{ArchiveRecord, ArchiveStore, Ledgers};
pub use cancel::CancellationToken;
pub use catalog::{CatalogClient, CatalogSource, LookupOutcome};
pub use config::{load_config, ArchiveConfig};
pub use error::{ArchiveError, Result};
pub use model_files::{discover, ContentHash, ModelFile};
pub use network::{AssetFetcher, HttpAssetFetcher, RetryPolicy};
pub use render::{BasicRenderer, PageRenderer};
pub use sync::{clean, CleanReport, ImagePolicy, Outcome, SyncEngine, SyncOptions, SyncReport};
