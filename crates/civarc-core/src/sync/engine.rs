//! The synchronization loop.

use crate::archive::{ArchiveRecord, ArchiveStore, AssetDescriptor, AssetKind, Bundle, Ledgers};
use crate::cancel::CancellationToken;
use crate::catalog::{CatalogSource, CatalogVersion, Fetched, LookupOutcome};
use crate::error::{ArchiveError, Result};
use crate::model_files::{read_header_metadata, ModelFile};
use crate::network::{asset_extension, full_size_url, is_permanent_failure, AssetFetcher, RetryPolicy};
use crate::render::{write_model_page, BasicRenderer, PageRenderer};
use crate::sync::classify::{
    classify, needs_hash, needs_refresh, Disposition, FileFacts, LookupKind, SkipReason,
};
use crate::sync::options::SyncOptions;
use crate::sync::pacing::{pacer_for, Pacer};
use crate::sync::report::{Outcome, SyncReport};
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::Map;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Drives catalog lookups, downloads and archive writes for a set of files.
pub struct SyncEngine<C, F> {
    catalog: C,
    fetcher: F,
    store: ArchiveStore,
    options: SyncOptions,
    retry: RetryPolicy,
    pacer: Box<dyn Pacer>,
    renderer: Box<dyn PageRenderer>,
}

impl<C: CatalogSource, F: AssetFetcher> SyncEngine<C, F> {
    pub fn new(catalog: C, fetcher: F, store: ArchiveStore, options: SyncOptions) -> Self {
        let pacer = pacer_for(options.no_timeout);
        Self {
            catalog,
            fetcher,
            store,
            options,
            retry: RetryPolicy::default(),
            pacer,
            renderer: Box::new(BasicRenderer),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pacer(mut self, pacer: impl Pacer + 'static) -> Self {
        self.pacer = Box::new(pacer);
        self
    }

    pub fn with_renderer(mut self, renderer: impl PageRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    pub fn renderer(&self) -> &dyn PageRenderer {
        self.renderer.as_ref()
    }

    /// Process `files` in order.
    ///
    /// Per-file failures become [`Outcome::Errored`] and the run moves on.
    /// Only run-level errors (see [`ArchiveError::is_fatal`]) and a failed
    /// final ledger flush are returned. Ledgers are flushed after every file
    /// that changed them.
    pub async fn run(
        &self,
        files: &[ModelFile],
        mut ledgers: Ledgers,
        cancel: &CancellationToken,
    ) -> Result<(SyncReport, Ledgers)> {
        let mut report = SyncReport::default();
        let mut pause_before_next = false;

        for (index, file) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if pause_before_next {
                self.pause(self.pacer.between_models()).await;
            }

            info!(
                "[{}/{}] {}",
                index + 1,
                files.len(),
                file.path().display()
            );
            let mut used_network = false;
            let outcome = match self
                .process_file(file, &mut ledgers, &mut used_network, cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(ArchiveError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) if e.is_fatal() => {
                    error!("Stopping the run at {}: {}", file.file_name(), e);
                    self.store.save_ledgers(&mut ledgers)?;
                    return Err(e);
                }
                Err(e) => {
                    error!("Failed to process {}: {}", file.file_name(), e);
                    Outcome::Errored(e.to_string())
                }
            };
            debug!("{} -> {:?}", file.file_name(), outcome);
            report.record(file.file_name(), &outcome);
            pause_before_next = used_network;

            if ledgers.is_dirty() {
                if let Err(e) = self.store.save_ledgers(&mut ledgers) {
                    warn!("Failed to flush ledgers after {}: {}", file.file_name(), e);
                }
            }
        }

        if report.cancelled {
            warn!("Cancellation requested, stopping after {} files", report.total());
        }
        self.store.save_ledgers(&mut ledgers)?;
        Ok((report, ledgers))
    }

    async fn process_file(
        &self,
        file: &ModelFile,
        ledgers: &mut Ledgers,
        used_network: &mut bool,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let key = file.sanitized_name();
        if key.is_empty() {
            return Err(ArchiveError::Other(format!(
                "{} sanitizes to an empty bundle name",
                file.file_name()
            )));
        }
        let in_missing = ledgers.missing.contains(file.file_name());

        // Decidable from the ledger alone; avoids hashing a large file.
        if self.options.skip_missing && self.options.only_new && in_missing {
            return Ok(Outcome::Skipped(SkipReason::KnownMissing));
        }

        let record = self.store.load(key)?;
        if needs_hash(&self.options) {
            file.hash().await?;
        } else if let Some(ref record) = record {
            file.seed_hash(record.hash.clone());
        }

        let ledger_key = file.ledger_key();
        let facts = FileFacts {
            in_missing,
            processed: ledgers.processed.get(&ledger_key),
            record: record.as_ref(),
            hash: file.cached_hash(),
        };

        match classify(&self.options, &facts) {
            Disposition::Skip(reason) => {
                debug!("Skipping {}: {:?}", file.file_name(), reason);
                Ok(Outcome::Skipped(reason))
            }
            Disposition::Conflict { stored } => Err(ArchiveError::BundleConflict {
                key: key.to_string(),
                stored: stored.to_string(),
                incoming: file.hash().await?.to_string(),
            }),
            Disposition::HtmlOnly => {
                if let Some(ref record) = record {
                    write_model_page(&self.store, self.renderer.as_ref(), key, record)?;
                }
                Ok(Outcome::HtmlOnly)
            }
            Disposition::Lookup(kind) => {
                *used_network = true;
                self.lookup_and_refresh(file, kind, record, ledgers, cancel)
                    .await
            }
        }
    }

    async fn lookup_and_refresh(
        &self,
        file: &ModelFile,
        kind: LookupKind,
        stored: Option<ArchiveRecord>,
        ledgers: &mut Ledgers,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let key = file.sanitized_name();
        let hash = file.hash().await?.clone();

        let lookup = match kind {
            LookupKind::ByHash => {
                let label = format!("Catalog lookup for {}", hash.short());
                self.retry
                    .run(&label, || self.catalog.lookup_by_hash(&hash))
                    .await
                    .0?
            }
            LookupKind::ByVersionId(id) => {
                let label = format!("Catalog lookup for version {}", id);
                self.retry
                    .run(&label, || self.catalog.lookup_version_by_id(id))
                    .await
                    .0?
            }
        };

        let version = match lookup {
            LookupOutcome::Found(version) => version,
            LookupOutcome::NotFound { status } => {
                info!(
                    "{} not found in the catalog (HTTP {})",
                    file.file_name(),
                    status
                );
                ledgers.missing.upsert(file.file_name(), status);
                return Ok(Outcome::Missing { status });
            }
        };

        let ledger_key = file.ledger_key();
        if !needs_refresh(&self.options, stored.as_ref(), version.parsed.updated_at) {
            info!("{} is up to date", file.file_name());
            ledgers.processed.record(&ledger_key, &hash, key);
            ledgers.missing.resolve(file.file_name());
            if let Some(ref record) = stored {
                if !self.store.page_path(key).exists() {
                    write_model_page(&self.store, self.renderer.as_ref(), key, record)?;
                }
            }
            return Ok(Outcome::UpToDate);
        }

        cancel.check()?;
        let model_id = version.parsed.model_id;
        let model = match self
            .retry
            .run(&format!("Catalog lookup for model {}", model_id), || {
                self.catalog.lookup_model_by_id(model_id)
            })
            .await
            .0?
        {
            LookupOutcome::Found(model) => Some(model.raw),
            LookupOutcome::NotFound { status } => {
                warn!(
                    "Model {} of {} not found (HTTP {}), archiving version data only",
                    model_id,
                    file.file_name(),
                    status
                );
                None
            }
        };

        let metadata = self.read_metadata(file).await;
        let assets = self.download_assets(key, &version, cancel).await?;

        let record = ArchiveRecord {
            hash: hash.clone(),
            file_name: file.file_name().to_string(),
            model_id,
            version_id: version.parsed.id,
            updated_at: version.parsed.updated_at,
            assets,
            metadata,
            archived_at: Utc::now(),
        };
        self.store.save(
            key,
            &Bundle {
                record: record.clone(),
                version: version.raw,
                model,
            },
        )?;
        write_model_page(&self.store, self.renderer.as_ref(), key, &record)?;

        ledgers.processed.record(&ledger_key, &hash, key);
        if ledgers.missing.resolve(file.file_name()) {
            info!("{} is now available in the catalog", file.file_name());
        }
        info!("Archived {} as {}", file.file_name(), key);
        Ok(Outcome::Processed)
    }

    async fn read_metadata(&self, file: &ModelFile) -> Map<String, serde_json::Value> {
        let path = file.path().to_path_buf();
        let result = tokio::task::spawn_blocking(move || read_header_metadata(&path))
            .await
            .map_err(|e| ArchiveError::Other(format!("Header task failed: {}", e)))
            .and_then(|r| r);

        result.unwrap_or_else(|e| {
            warn!("No header metadata for {}: {}", file.file_name(), e);
            Map::new()
        })
    }

    /// Download the preview assets the image policy selects.
    ///
    /// Files already on disk are kept as they are. A permanent failure skips
    /// the asset; anything else fails the model.
    async fn download_assets(
        &self,
        key: &str,
        version: &Fetched<CatalogVersion>,
        cancel: &CancellationToken,
    ) -> Result<Vec<AssetDescriptor>> {
        let images = &version.parsed.images;
        let selected = self.options.image_policy.limit(images.len());
        let mut assets = Vec::with_capacity(selected);
        let mut downloaded_any = false;

        for (ordinal, image) in images.iter().enumerate().take(selected) {
            cancel.check()?;
            if image.url.is_empty() {
                continue;
            }

            let url = full_size_url(&image.url);
            let is_video = image.is_video();
            let ext = asset_extension(&url, is_video);
            let dest = self.store.asset_path(key, ordinal, &ext);

            if dest.exists() {
                debug!("Keeping existing {}", dest.display());
                if !dest.with_extension("json").exists() {
                    self.store.add_asset(&dest, image)?;
                }
            } else {
                if downloaded_any {
                    self.pause(self.pacer.between_assets()).await;
                }
                downloaded_any = true;

                let (result, _) = self
                    .retry
                    .run(&format!("Download {}", url), || self.fetcher.fetch(&url, &dest))
                    .await;
                match result {
                    Ok(_) => self.store.add_asset(&dest, image)?,
                    Err(ArchiveError::DownloadFailed { status, .. })
                        if StatusCode::from_u16(status)
                            .map(is_permanent_failure)
                            .unwrap_or(false) =>
                    {
                        warn!("Skipping preview {} (HTTP {})", url, status);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let filename = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            assets.push(AssetDescriptor {
                url,
                filename,
                ordinal,
                kind: if is_video {
                    AssetKind::Video
                } else {
                    AssetKind::Image
                },
            });
        }

        Ok(assets)
    }

    async fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            debug!("Waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}
