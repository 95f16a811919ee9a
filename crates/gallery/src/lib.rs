//! The photography gallery: photo records, the sidecars they live in, and
//! the operations the HTTP layer and the CLI run against them.
//!
//! - [`reload`]: rebuild the store from the sidecars on disk.
//! - [`Gallery::begin`] / [`Gallery::upload`]: issue an identity and attach
//!   uploaded files to it.
//! - [`Gallery::all_tags`] / [`Gallery::photos_by_tags`] /
//!   [`Gallery::photo_data`]: read back what the last reload stored.

pub mod error;
mod ingest;
pub mod models;
mod query;
pub mod reload;
pub mod sidecar;

pub use crate::ingest::Upload;
pub use crate::query::TagQuery;

use crate::error::{ErrorKind, Result};
use crate::reload::{ReloadEvent, ReloadMode, ReloadOptions};
use async_stream::stream;
use exn::ResultExt;
use futures::Stream;
use shutter_storage::BackendHandle;
use shutter_store::Photos;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Handle to the photography directory and the collections built from it.
///
/// Cheap to clone; clones share the reload lock.
#[derive(Clone)]
pub struct Gallery {
    backend: BackendHandle,
    photos: Photos,
    concurrency: usize,
    reload_lock: Arc<Mutex<()>>,
}

impl Gallery {
    pub fn new(backend: BackendHandle, photos: Photos) -> Self {
        Self {
            backend,
            photos,
            concurrency: reload::DEFAULT_CONCURRENCY,
            reload_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Number of sidecars a reload processes at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Start a reload run.
    ///
    /// Fails straight away with [`ErrorKind::ReloadInProgress`] if another run
    /// is still going; runs are never queued. The returned stream owns
    /// everything it needs and holds the lock until it is finished or
    /// dropped, so it can be handed to [`tokio::spawn`].
    pub fn reload(&self, mode: ReloadMode) -> Result<impl Stream<Item = Result<ReloadEvent>> + Send + 'static> {
        let guard = Arc::clone(&self.reload_lock).try_lock_owned().or_raise(|| ErrorKind::ReloadInProgress)?;
        let backend = Arc::clone(&self.backend);
        let photos = self.photos.clone();
        let options = ReloadOptions {
            mode,
            concurrency: self.concurrency,
        };
        Ok(stream! {
            let _guard = guard;
            for await event in reload::reload(&backend, &photos, options) {
                yield event;
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::StreamExt;
    use shutter_storage::backend::MockBackend;
    use shutter_store::Database;

    pub(crate) const ID_A: &str = "0b6f9f4e-3c1a-4b59-9d0c-8f6d2f0a7e11";
    pub(crate) const ID_B: &str = "5d3c2a10-98e4-4f0b-a1c7-2be6f4d9c033";

    pub(crate) async fn gallery(backend: MockBackend) -> (Database, Arc<MockBackend>, Gallery) {
        let db = Database::connect_in_memory().await.unwrap();
        let backend = Arc::new(backend);
        let gallery = Gallery::new(backend.clone(), Photos::from(&db));
        (db, backend, gallery)
    }

    #[tokio::test]
    async fn test_concurrent_reload_is_rejected() {
        let (db, _, gallery) = gallery(MockBackend::default()).await;
        let first = gallery.reload(ReloadMode::Rebuild).unwrap();
        let err = gallery.clone().reload(ReloadMode::Incremental).err().unwrap();
        assert!(matches!(&*err, ErrorKind::ReloadInProgress));

        // Running the first stream to the end releases the lock.
        let events: Vec<_> = first.collect().await;
        assert!(matches!(events.last(), Some(Ok(ReloadEvent::Complete(_)))));
        assert!(gallery.reload(ReloadMode::Rebuild).is_ok());
        db.close().await;
    }

    #[tokio::test]
    async fn test_dropped_reload_releases_lock() {
        let (db, _, gallery) = gallery(MockBackend::default()).await;
        let stream = gallery.reload(ReloadMode::Rebuild).unwrap();
        drop(stream);
        assert!(gallery.reload(ReloadMode::Rebuild).is_ok());
        db.close().await;
    }
}
