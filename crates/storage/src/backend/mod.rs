//! The [`StorageBackend`] seam: the handful of file operations the gallery
//! needs, plus the recursive directory walk that drives a reload.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// File access relative to one storage root.
///
/// # Path Handling
/// Callers pass paths relative to the root; every implementation runs them
/// through [`validate_path`](crate::validate_path) first, so nothing can
/// reach outside the root.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shutter_storage::{backend::StorageBackend, error::Result};
///
/// async fn publish(backend: &dyn StorageBackend, id: &str, staged: &Path) -> Result<()> {
///     backend.rename(staged, &Path::new(id).join("raw.ARW")).await?;
///     let sidecar = backend.read(&Path::new(id).join("metadata.json")).await?;
///     backend.write(&Path::new(id).join("metadata.json"), &sidecar).await
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Verify that the storage root can be enumerated at all.
    ///
    /// A walk over [`list_stream()`](Self::list_stream) reports unreadable
    /// subdirectories as individual errors and keeps going; callers that need
    /// to tell "nothing to walk" apart from "the root itself is broken" call
    /// this first.
    async fn check(&self) -> Result<()>;

    /// Walk the storage tree depth-first, yielding every regular file.
    ///
    /// Directories are descended into without bound; anything that is neither
    /// a regular file nor a directory (symlinks included) is skipped, so the
    /// walk is always over a tree. The order of yielded files is unspecified.
    ///
    /// A directory that cannot be read yields a single `Err` item and its
    /// subtree is abandoned; the walk then carries on with the directories
    /// it had already queued. If a prefix is provided, only files whose paths
    /// start with the prefix (component-wise) are returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::StreamExt;
    /// # use shutter_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) {
    /// let mut stream = backend.list_stream(None);
    /// while let Some(item) = stream.next().await {
    ///     match item {
    ///         Ok(info) => println!("{}: {} bytes", info.path.display(), info.size),
    ///         Err(e) => eprintln!("skipping unreadable directory: {e}"),
    ///     }
    /// }
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents.
    ///
    /// Creates a new file or overwrites an existing file with the provided
    /// data. Parent directories are created as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Add `data` to the end of a file, creating it (and its parent
    /// directories) when missing. Uploads arrive in chunks this way.
    async fn append(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Move a file, e.g. out of staging and into an identity folder.
    ///
    /// Missing parent directories of `to` are created and an existing file
    /// at `to` is replaced. Fails with
    /// [`NotFound`](crate::error::ErrorKind::NotFound) when `from` is absent.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}
