//! civarc - archive Civitai metadata for local SafeTensors models.
//!
//! Thin front end over `civarc-core`: resolves flags and `config.json`,
//! sets up logging and Ctrl-C handling, then runs one of the sync, clean or
//! sidecar-regeneration passes and refreshes the index page.

mod args;

use anyhow::Result;
use args::{io_paths, Args};
use civarc_core::render::write_index;
use civarc_core::{
    clean, discover, ArchiveError, ArchiveStore, BasicRenderer, CancellationToken, CatalogClient,
    HttpAssetFetcher, SyncEngine,
};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = args.resolve_config()?;
    let (input, output) = io_paths(&config)?;

    let store = ArchiveStore::new(&output);
    store.ensure_writable()?;
    info!("Archive directory: {}", output.display());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing the current model");
                cancel.cancel();
            }
        });
    }

    let renderer = BasicRenderer;

    if config.generateimagejson {
        let written = store.regenerate_asset_sidecars()?;
        println!("Generated {} preview JSON files", written);
    } else {
        let files = discover(&input)?;

        if config.clean {
            let mut ledgers = store.load_ledgers()?;
            match clean(&store, &files, &mut ledgers, &cancel).await {
                Ok(report) => print!("{}", report),
                Err(ArchiveError::Cancelled) => warn!("Cleanup cancelled"),
                Err(e) => return Err(e.into()),
            }
        } else {
            let engine = SyncEngine::new(
                CatalogClient::new(config.api_base(), config.api_key.clone())?,
                HttpAssetFetcher::new(config.api_key.clone())?,
                store.clone(),
                config.sync_options(),
            )
            .with_renderer(renderer);

            let (report, _ledgers) = engine.run(&files, store.load_ledgers()?, &cancel).await?;
            print!("{}", report);
        }
    }

    if let Err(e) = write_index(&store, &renderer) {
        warn!("Failed to update the index page: {}", e);
    }

    Ok(())
}
