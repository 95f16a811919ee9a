//! Ingestion: issuing identities and attaching uploaded variants to them.
//!
//! Uploads arrive in two steps. The transport [stages](Upload::stage) every
//! file as its chunks come in; the handler then either
//! [attaches](Upload::attach) them to an identity or
//! [discards](Upload::discard) them. Either way nothing stays in staging,
//! not even when the request is dropped half-way through its body.

use crate::Gallery;
use crate::error::{ErrorKind, Result};
use crate::models::{PhotoRecord, Tags, parse_identity, variant_name};
use crate::sidecar::{self, STAGING_DIR};
use exn::ResultExt;
use futures::{Stream, StreamExt};
use shutter_storage::error::ErrorKind as StorageErrorKind;
use shutter_storage::validate_file_name;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// An uploaded file parked in the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StagedFile {
    path: PathBuf,
    /// As the client sent it, unvalidated.
    file_name: String,
}

/// The files staged for one upload request.
///
/// Whatever it still holds when dropped is deleted on a background task, so
/// a client that disconnects mid-body leaves nothing in `.staging/`.
pub struct Upload {
    gallery: Gallery,
    staged: Vec<StagedFile>,
}

fn now_millis() -> i64 {
    // Infallible until the year 292 million.
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

impl Gallery {
    /// Issue a new identity and write its first sidecar: tags, identity and
    /// upload time.
    #[instrument(skip(self, tags), fields(tag_count = tags.len()))]
    pub async fn begin(&self, tags: Tags) -> Result<String> {
        let id = Uuid::new_v4().hyphenated().to_string();
        let record = PhotoRecord::new(id.clone(), tags, now_millis());
        let bytes = sidecar::serialize(&record)?;
        self.backend.write(&sidecar::sidecar_path(&id), &bytes).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(id = %id, "Created photo identity");
        Ok(id)
    }

    /// Start receiving the files of one upload request.
    pub fn upload(&self) -> Upload {
        Upload {
            gallery: self.clone(),
            staged: Vec::new(),
        }
    }

    /// Delete staged files. Files that are already gone are ignored, other
    /// failures are logged and otherwise ignored.
    async fn discard_staged(&self, staged: &[StagedFile]) {
        for file in staged {
            match self.backend.delete(&file.path).await {
                Ok(()) => tracing::debug!(path = %file.path.display(), "Discarded staged upload"),
                Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => {},
                Err(e) => tracing::warn!(path = %file.path.display(), error = ?e, "Could not discard staged upload"),
            }
        }
    }

    /// Move staged files into the identity folder of `id` and record each as
    /// a variant in its sidecar: `raw.ARW` is stored as `"raw": "raw.ARW"`.
    ///
    /// Every filename is checked before anything is moved, so a rejected
    /// upload changes nothing. If a move fails part-way, the files already
    /// moved are still recorded before the error is returned. The store
    /// only sees the new variants after the next reload.
    #[instrument(skip(self, staged), fields(files = staged.len()))]
    async fn upload_variants(&self, id: &str, staged: &[StagedFile]) -> Result<Vec<String>> {
        let id = parse_identity(id)?;
        let mut planned = Vec::with_capacity(staged.len());
        for file in staged {
            let file_name = validate_file_name(&file.file_name)
                .or_raise(|| ErrorKind::InvalidInput(format!("`{}` is not a plain filename", file.file_name)))?;
            planned.push((file, file_name, variant_name(file_name)?));
        }

        let sidecar_path = sidecar::sidecar_path(id);
        let bytes = match self.backend.read(&sidecar_path).await {
            Ok(bytes) => bytes,
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => exn::bail!(ErrorKind::NotFound(id.to_string())),
            Err(e) => return Err(e.raise(ErrorKind::Storage)),
        };
        let mut record = sidecar::parse(&bytes)?;

        let mut variants = Vec::with_capacity(planned.len());
        let mut failed = None;
        for (file, file_name, variant) in planned {
            if let Err(e) = self.backend.rename(&file.path, &Path::new(id).join(file_name)).await {
                tracing::warn!(id, file_name, error = ?e, "Could not move staged upload");
                failed = Some(e.raise(ErrorKind::Storage));
                break;
            }
            record.set_variant(variant, file_name)?;
            variants.push(variant.to_string());
        }
        if failed.is_none() || !variants.is_empty() {
            let bytes = sidecar::serialize(&record)?;
            self.backend.write(&sidecar_path, &bytes).await.or_raise(|| ErrorKind::Storage)?;
        }
        if let Some(error) = failed {
            return Err(error);
        }
        tracing::info!(id, variants = ?variants, "Attached uploaded variants");
        Ok(variants)
    }
}

impl Upload {
    /// Write one uploaded file to `.staging/<random>` chunk by chunk.
    ///
    /// The client's filename is kept alongside but not validated yet: that
    /// only matters once the files are [attached](Self::attach). A chunk
    /// stream that fails part-way is an [`InvalidInput`](ErrorKind::InvalidInput)
    /// error; the partial file stays tracked and is removed with the rest.
    pub async fn stage<S, B, E>(&mut self, file_name: &str, chunks: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let path = Path::new(STAGING_DIR).join(Uuid::new_v4().simple().to_string());
        // Tracked before the first byte lands.
        self.staged.push(StagedFile {
            path: path.clone(),
            file_name: file_name.to_string(),
        });
        let backend = &self.gallery.backend;
        backend.write(&path, &[]).await.or_raise(|| ErrorKind::Storage)?;

        let mut chunks = std::pin::pin!(chunks);
        let mut size = 0;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.or_raise(|| ErrorKind::InvalidInput(format!("upload of `{file_name}` was cut short")))?;
            let chunk = chunk.as_ref();
            backend.append(&path, chunk).await.or_raise(|| ErrorKind::Storage)?;
            size += chunk.len();
        }
        tracing::debug!(path = %path.display(), file_name, size, "Staged upload");
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Attach every staged file to the identity `id`; see
    /// [`Gallery::begin`] for how identities are issued. Returns the variant
    /// names, in upload order.
    ///
    /// On error whatever is still in staging is deleted before returning.
    pub async fn attach(mut self, id: &str) -> Result<Vec<String>> {
        let result = self.gallery.upload_variants(id, &self.staged).await;
        if result.is_err() {
            self.gallery.discard_staged(&self.staged).await;
        }
        self.staged.clear();
        result
    }

    /// Delete every staged file now.
    pub async fn discard(mut self) {
        self.gallery.discard_staged(&self.staged).await;
        self.staged.clear();
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        let staged = std::mem::take(&mut self.staged);
        let gallery = self.gallery.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { gallery.discard_staged(&staged).await });
            },
            Err(_) => tracing::warn!(files = staged.len(), "No runtime left to discard staged uploads on"),
        }
    }
}
