//! `shutter`: the personal-site backend.
//!
//! Wires configuration, tracing, the database and the photography directory
//! together, then either serves HTTP or runs a single reload.

pub mod cli;
pub mod error;
pub mod journal;
pub mod secrets;
pub mod server;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use crate::journal::JournalQueue;
use crate::secrets::SecretsFile;
use crate::server::AppState;
use exn::ResultExt;
use futures::StreamExt;
use shutter_config::Config;
use shutter_gallery::Gallery;
use shutter_gallery::reload::{ReloadEvent, ReloadMode};
use shutter_storage::BackendHandle;
use shutter_storage::backend::LocalBackend;
use shutter_store::{Database, Journal, Photos};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let queue = init_tracing(&config)?;

    if let Some(parent) = config.database.parent() {
        tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
    }
    let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Database)?;
    let writer = queue.spawn(Journal::from(&db));

    let root = std::path::absolute(&config.photography_directory).or_raise(|| ErrorKind::Storage)?;
    let backend: BackendHandle = Arc::new(LocalBackend::new("photography", root).or_raise(|| ErrorKind::Storage)?);
    let gallery = Gallery::new(backend, Photos::from(&db)).with_concurrency(config.reload_concurrency);

    let result = match cli.command {
        Command::Serve => serve(&config, &db, gallery).await,
        Command::Reload { incremental } => {
            let mode = match incremental {
                true => ReloadMode::Incremental,
                false => ReloadMode::Rebuild,
            };
            reload(&gallery, mode).await
        },
    };
    if let Err(e) = &result {
        tracing::error!(error = ?e, "Exiting after failure");
    }
    writer.flush().await;
    writer.abort();
    db.close().await;
    result
}

/// Console output filtered by `RUST_LOG` (or `log_level`), plus the journal
/// layer with its own threshold.
fn init_tracing(config: &Config) -> Result<JournalQueue> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).or_raise(|| ErrorKind::Tracing)?,
    };
    let (journal, queue) = journal::layer(config.journal_threshold());
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .with(journal)
        .try_init()
        .or_raise(|| ErrorKind::Tracing)?;
    Ok(queue)
}

async fn serve(config: &Config, db: &Database, gallery: Gallery) -> Result<()> {
    let state = AppState {
        gallery,
        journal: Journal::from(db),
        secrets: Arc::new(SecretsFile::new(&config.secrets)),
        site_base: Arc::from(config.site_base()),
        max_upload_bytes: config.max_upload_bytes,
    };
    let listener = TcpListener::bind(config.listen).await.or_raise(|| ErrorKind::Server)?;
    server::serve(listener, state).await
}

async fn reload(gallery: &Gallery, mode: ReloadMode) -> Result<()> {
    let events = gallery.reload(mode).or_raise(|| ErrorKind::Reload)?;
    let mut events = std::pin::pin!(events);
    while let Some(event) = events.next().await {
        match event.or_raise(|| ErrorKind::Reload)? {
            ReloadEvent::Skipped { path: Some(path), .. } => println!("skipped {}", path.display()),
            ReloadEvent::Skipped { path: None, .. } => println!("skipped an unreadable directory"),
            ReloadEvent::Complete(summary) => {
                println!(
                    "reloaded {} of {} sidecars ({} enriched, {} without EXIF, {} skipped), {} tags",
                    summary.reloaded,
                    summary.discovered,
                    summary.enriched,
                    summary.enrichment_failures,
                    summary.skipped,
                    summary.tags.len()
                );
            },
            _ => {},
        }
    }
    Ok(())
}
