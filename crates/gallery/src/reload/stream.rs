use crate::error::{ErrorKind as GalleryErrorKind, Result as GalleryResult};
use crate::models::{PhotoRecord, TagIndex, Tags};
use crate::reload::enrich::enrich;
use crate::reload::error::{Error, ErrorKind, Result};
use crate::sidecar;
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt, future};
use shutter_storage::BackendHandle;
use shutter_store::Photos;
use std::path::{Path, PathBuf};

/// Default number of sidecars processed at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// What happens to the existing collections before the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadMode {
    /// Drop and recreate `photos` and `tags`, so records whose sidecar has
    /// disappeared go away too.
    #[default]
    Rebuild,
    /// Upsert over whatever is stored already.
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOptions {
    pub mode: ReloadMode,
    /// Sidecars in flight at once; `0` is treated as `1`.
    pub concurrency: usize,
}
impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            mode: ReloadMode::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// A sidecar that made it into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reloaded {
    pub path: PathBuf,
    pub id: String,
    pub tags: Tags,
    /// `false` when EXIF enrichment failed and the record went in as-is.
    pub enriched: bool,
}

/// Counters for one finished run, plus the tag index it flushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Files that passed the sidecar filter.
    pub discovered: u64,
    /// Sidecars upserted into the store.
    pub reloaded: u64,
    /// Of those, how many were enriched with EXIF fields.
    pub enriched: u64,
    /// Of those, how many went in without EXIF fields.
    pub enrichment_failures: u64,
    /// Sidecars (and unreadable directories) that were skipped.
    pub skipped: u64,
    pub tags: TagIndex,
}

/// Progress events emitted by [`reload`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`Rebuilt`](Self::Rebuilt): once in [`ReloadMode::Rebuild`], never in
///    [`ReloadMode::Incremental`].
/// 3. [`Reloaded`](Self::Reloaded) and [`Skipped`](Self::Skipped): zero or
///    more times, interleaved, one per sidecar or unreadable directory.
/// 4. [`Flushed`](Self::Flushed): exactly once, with the number of tags.
/// 5. [`Complete`](Self::Complete): exactly once, signalling the stream is
///    finished.
///
/// A fatal error terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum ReloadEvent {
    Started,
    Rebuilt,
    Reloaded(Reloaded),
    /// `path` is the sidecar, or `None` when a directory could not be read.
    Skipped {
        path: Option<PathBuf>,
        error: Error,
    },
    Flushed(usize),
    Complete(ReloadSummary),
}

/// Streams [`ReloadEvent`]s while rebuilding the store from the sidecars
/// found under `backend`.
///
/// Sidecars are read, enriched and upserted concurrently, up to
/// `options.concurrency` at a time. The tag index is built up in this
/// stream's own loop as results come back, then written as one document.
///
/// Only an unreadable storage root, a failed rebuild or a failed flush is
/// fatal. Anything going wrong with a single sidecar becomes a
/// [`Skipped`](ReloadEvent::Skipped) event.
pub fn reload<'a>(
    backend: &'a BackendHandle,
    photos: &'a Photos,
    options: ReloadOptions,
) -> impl Stream<Item = GalleryResult<ReloadEvent>> + 'a {
    stream! {
        for await event in reload_inner(backend, photos, options) {
            yield event.or_raise(|| GalleryErrorKind::Reload);
        }
    }
}

fn reload_inner<'a>(
    backend: &'a BackendHandle,
    photos: &'a Photos,
    options: ReloadOptions,
) -> impl Stream<Item = Result<ReloadEvent>> + 'a {
    stream!({
        yield Ok(ReloadEvent::Started);
        tracing::info!(backend = backend.name(), mode = ?options.mode, "Reloading photo collections from sidecars");

        if let Err(e) = backend.check().await.or_raise(|| ErrorKind::Root) {
            yield Err(e);
            return;
        }
        if options.mode == ReloadMode::Rebuild {
            if let Err(e) = photos.recreate_collections().await.or_raise(|| ErrorKind::Rebuild) {
                yield Err(e);
                return;
            }
            yield Ok(ReloadEvent::Rebuilt);
        }

        let mut summary = ReloadSummary::default();
        let mut tags = TagIndex::default();
        let mut outcomes = backend
            .list_stream(None)
            .filter_map(|item| {
                future::ready(match item {
                    Ok(file) if sidecar::is_sidecar(&file.path) => Some(Ok(file.path)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
            })
            .map(|item| async move {
                match item {
                    Ok(path) => {
                        let outcome = match load_sidecar(backend, &path).await {
                            Ok(record) => {
                                let seen = record.tags.clone();
                                (Some(seen), store_record(backend, photos, &path, record).await)
                            },
                            Err(e) => (None, Err(e)),
                        };
                        (Some(path), outcome)
                    },
                    Err(e) => (None, (None, Err(e.raise(ErrorKind::Walk)))),
                }
            })
            .buffer_unordered(options.concurrency.max(1));

        while let Some((path, (seen, outcome))) = outcomes.next().await {
            if path.is_some() {
                summary.discovered += 1;
            }
            // A parsed sidecar's tags count even if a later step fails.
            if let Some(seen) = &seen {
                tags.merge(seen);
            }
            match outcome {
                Ok(reloaded) => {
                    summary.reloaded += 1;
                    match reloaded.enriched {
                        true => summary.enriched += 1,
                        false => summary.enrichment_failures += 1,
                    }
                    yield Ok(ReloadEvent::Reloaded(reloaded));
                },
                Err(error) => {
                    summary.skipped += 1;
                    match &path {
                        Some(p) => tracing::warn!(path = %p.display(), error = ?error, "Skipping sidecar"),
                        None => tracing::warn!(error = ?error, "Skipping unreadable directory"),
                    }
                    yield Ok(ReloadEvent::Skipped { path, error });
                },
            }
        }
        drop(outcomes);

        if let Err(e) = photos.replace_tags(&tags.to_document()).await.or_raise(|| ErrorKind::Flush) {
            yield Err(e);
            return;
        }
        yield Ok(ReloadEvent::Flushed(tags.len()));
        summary.tags = tags;

        tracing::info!(
            discovered = summary.discovered,
            reloaded = summary.reloaded,
            enriched = summary.enriched,
            enrichment_failures = summary.enrichment_failures,
            skipped = summary.skipped,
            tags = summary.tags.len(),
            "Reload complete"
        );
        yield Ok(ReloadEvent::Complete(summary));
    })
}

async fn load_sidecar(backend: &BackendHandle, path: &Path) -> Result<PhotoRecord> {
    let bytes = backend.read(path).await.or_raise(|| ErrorKind::Storage)?;
    sidecar::parse(&bytes).or_raise(|| ErrorKind::Sidecar)
}

/// Enrich one parsed sidecar, write the enriched version back and upsert it.
///
/// Enrichment failing is not an error here: the record is upserted without
/// EXIF fields and the sidecar is left as it was.
async fn store_record(backend: &BackendHandle, photos: &Photos, path: &Path, record: PhotoRecord) -> Result<Reloaded> {
    let (record, enriched) = match enrich(backend, &record).await {
        Ok(enriched) => {
            let bytes = sidecar::serialize(&enriched).or_raise(|| ErrorKind::Sidecar)?;
            backend.write(path, &bytes).await.or_raise(|| ErrorKind::Storage)?;
            (enriched, true)
        },
        Err(error) => {
            tracing::warn!(path = %path.display(), id = %record.id, error = ?error, "EXIF enrichment failed");
            (record, false)
        },
    };
    let document = record.to_document().or_raise(|| ErrorKind::Sidecar)?;
    photos.upsert(&record.id, &document).await.or_raise(|| ErrorKind::Store)?;
    Ok(Reloaded {
        path: path.to_path_buf(),
        id: record.id,
        tags: record.tags,
        enriched,
    })
}
