//! A photography directory held in memory, for tests in this and
//! downstream crates.

use super::FileInfoStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredFile {
    modified: OffsetDateTime,
    data: Vec<u8>,
}

impl StoredFile {
    fn new(data: Vec<u8>) -> Self {
        Self {
            modified: OffsetDateTime::now_utc(),
            data,
        }
    }

    fn info(&self, path: &Path) -> FileInfo {
        FileInfo::new(path, self.data.len() as u64, self.modified)
    }
}

/// [`StorageBackend`] over a map of paths to file contents.
///
/// Directories are implicit: a file at `a/b/c.json` makes `a` and `a/b`
/// exist. The map sits behind a [`RwLock`], so the backend can be shared
/// between concurrent reload tasks like a real one.
///
/// # Examples
///
/// ```
/// use shutter_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("9b1deb4d/metadata.json", br#"{"id":"9b1deb4d","tags":{}}"#.to_vec()),
/// ]);
/// assert!(backend.read(Path::new("9b1deb4d/metadata.json")).await.is_ok());
///
/// backend.write(Path::new("9b1deb4d/raw.jpg"), b"...").await?;
/// assert_eq!(backend.paths().await.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    broken: bool,
    read_only: HashSet<PathBuf>,
    files: RwLock<HashMap<PathBuf, StoredFile>>,
}

impl MockBackend {
    /// A backend already holding `files`.
    ///
    /// # Panics
    ///
    /// When a path does not pass [`validate_path`]: a test with a broken
    /// fixture should not get as far as asserting anything.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let files = files
            .into_iter()
            .map(|(path, data)| {
                let path = path.into();
                match validate_path(&path) {
                    Ok(validated) => (validated, StoredFile::new(data.into())),
                    Err(_) => panic!("MockBackend::with_files: invalid path {}", path.display()),
                }
            })
            .collect();
        Self {
            name: "mock".to_string(),
            broken: false,
            read_only: HashSet::new(),
            files: RwLock::new(files),
        }
    }

    /// Rename the backend, as it appears in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Simulate a storage root that cannot be enumerated: [`check`] fails and
    /// the walk yields nothing but an error. Reads and writes still work.
    ///
    /// [`check`]: StorageBackend::check
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Refuse every write, append or rename onto `path` with
    /// [`PermissionDenied`](ErrorKind::PermissionDenied), like a file the
    /// server may not replace.
    ///
    /// # Panics
    ///
    /// When `path` does not pass [`validate_path`].
    pub fn with_read_only(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match validate_path(&path) {
            Ok(validated) => self.read_only.insert(validated),
            Err(_) => panic!("MockBackend::with_read_only: invalid path {}", path.display()),
        };
        self
    }

    /// All stored paths, sorted. Handy for asserting on the whole tree.
    pub async fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn root_error(&self) -> ErrorKind {
        ErrorKind::RootUnavailable(self.name.clone())
    }

    fn writable(&self, path: &Path) -> Result<PathBuf> {
        let path = validate_path(path)?;
        if self.read_only.contains(&path) {
            exn::bail!(ErrorKind::PermissionDenied(path));
        }
        Ok(path)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::with_files(std::iter::empty::<(PathBuf, Vec<u8>)>())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<()> {
        if self.broken {
            exn::bail!(self.root_error());
        }
        Ok(())
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let prefix = match prefix.map(validate_path).transpose() {
            Ok(prefix) => prefix,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        if self.broken {
            let err = exn::Exn::from(self.root_error());
            return Box::pin(futures::stream::once(async move { Err(err) }));
        }

        Box::pin(stream! {
            // Copy out what matches so the lock is not held while yielding.
            let matching: Vec<FileInfo> = self
                .files
                .read()
                .await
                .iter()
                .filter(|(path, _)| prefix.as_ref().is_none_or(|prefix| path.starts_with(prefix)))
                .map(|(path, file)| file.info(path))
                .collect();
            for info in matching {
                yield Ok(info);
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let file = self.files.read().await.get(&path).cloned();
        match file {
            Some(file) => Ok(file.data),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = self.writable(path)?;
        self.files.write().await.insert(path, StoredFile::new(data.to_vec()));
        Ok(())
    }

    async fn append(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = self.writable(path)?;
        let mut files = self.files.write().await;
        let file = files.entry(path).or_insert_with(|| StoredFile::new(Vec::new()));
        file.data.extend_from_slice(data);
        file.modified = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let removed = self.files.write().await.remove(&path);
        match removed {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = validate_path(from)?;
        let to = self.writable(to)?;
        let mut files = self.files.write().await;
        let Some(file) = files.remove(&from) else {
            exn::bail!(ErrorKind::NotFound(from));
        };
        files.insert(to, file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn list(backend: &MockBackend, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        backend.list_stream(prefix).try_collect().await
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("id/metadata.json"), b"{}").await.unwrap();
        let data = backend.read(Path::new("id/metadata.json")).await.unwrap();
        assert_eq!(data, b"{}");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.json")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MockBackend::default();
        backend.write(Path::new(".staging/x/raw.jpg"), b"data").await.unwrap();
        backend.delete(Path::new(".staging/x/raw.jpg")).await.unwrap();
        assert!(backend.paths().await.is_empty());
        let err = backend.delete(Path::new(".staging/x/raw.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename() {
        let backend = MockBackend::default();
        backend.write(Path::new(".staging/x/raw.jpg"), b"data").await.unwrap();
        backend.rename(Path::new(".staging/x/raw.jpg"), Path::new("id/raw.jpg")).await.unwrap();
        assert_eq!(backend.paths().await, vec![PathBuf::from("id/raw.jpg")]);
        let err = backend.rename(Path::new("missing.jpg"), Path::new("id/full.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_append() {
        let backend = MockBackend::default();
        backend.append(Path::new(".staging/ab12"), b"123").await.unwrap();
        backend.append(Path::new(".staging/ab12"), b"45").await.unwrap();
        assert_eq!(backend.read(Path::new(".staging/ab12")).await.unwrap(), b"12345");
        let files = list(&backend, None).await.unwrap();
        assert_eq!(files[0].size, 5);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let backend = MockBackend::with_files([
            ("one/metadata.json", b"a".to_vec()),
            ("one/raw.jpg", b"b".to_vec()),
            ("two/metadata.json", b"c".to_vec()),
        ]);
        let files = list(&backend, Some(Path::new("one"))).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(list(&backend, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_broken_root() {
        let backend = MockBackend::with_files([("one/metadata.json", b"a".to_vec())]).broken();
        let err = backend.check().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RootUnavailable(name) if name == "mock"));
        assert!(list(&backend, None).await.is_err());
        // Direct access is unaffected.
        assert!(backend.read(Path::new("one/metadata.json")).await.is_ok());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape"), b"bad").await.is_err());
    }

    #[tokio::test]
    async fn test_read_only_path() {
        let backend = MockBackend::with_files([("id/raw.jpg", b"old".to_vec())]).with_read_only("id/raw.jpg");
        backend.write(Path::new(".staging/x"), b"new").await.unwrap();
        let err = backend.rename(Path::new(".staging/x"), Path::new("id/raw.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(_)));
        assert!(backend.write(Path::new("id/raw.jpg"), b"new").await.is_err());
        assert!(backend.append(Path::new("id/raw.jpg"), b"new").await.is_err());
        // Nothing moved or changed.
        assert_eq!(backend.read(Path::new("id/raw.jpg")).await.unwrap(), b"old");
        assert_eq!(backend.read(Path::new(".staging/x")).await.unwrap(), b"new");
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", b"bad".to_vec())]);
    }
}
