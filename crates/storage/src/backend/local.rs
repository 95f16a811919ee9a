//! Storage rooted in a directory on local disk: the photography directory
//! the site serves images from.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry, ReadDir};
use tokio::io::AsyncWriteExt;

/// What the walk does with one directory entry.
enum Visit {
    Yield(FileInfo),
    Enter(PathBuf),
    Ignore,
}

/// Translate an I/O failure on `path` (relative or absolute, whichever the
/// caller knows) into a storage error.
fn io_error(e: io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}

fn file_info(path: &Path, metadata: &Metadata) -> Result<FileInfo> {
    let modified = metadata.modified().map_err(ErrorKind::Io)?;
    Ok(FileInfo::new(path, metadata.len(), modified.into()))
}

/// Storage backed by `tokio::fs`, confined to one root directory.
///
/// Every path handed in is relative to the root and validated before it
/// touches the disk, and every path handed out is relative again.
///
/// # Examples
///
/// ```no_run
/// use shutter_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("photography", "/srv/http/images/photography")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Use `root` as the storage root, creating it when missing.
    ///
    /// # Errors
    ///
    /// [`InvalidPath`](ErrorKind::InvalidPath) when `root` is relative or is
    /// something other than a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || (root.exists() && !root.is_dir()) {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        // Blocking, but only ever once at startup.
        std::fs::create_dir_all(&root).map_err(|e| io_error(e, &root))?;
        Ok(Self { name: name.into(), root })
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(path.as_ref())?))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let outside = || ErrorKind::OutsideRoot(absolute.to_path_buf());
        if !absolute.is_absolute() {
            exn::bail!(outside());
        }
        let relative = absolute.strip_prefix(&self.root).or_raise(outside)?;
        Ok(validate_path(relative)?)
    }

    async fn ensure_parent(&self, absolute: &Path, relative: &Path) -> Result<()> {
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(|e| io_error(e, relative))?;
        }
        Ok(())
    }

    /// `None` when the directory disappeared between being queued and being
    /// opened.
    async fn open_dir(directory: &Path) -> Result<Option<ReadDir>> {
        match fs::read_dir(directory).await {
            Ok(entries) => Ok(Some(entries)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                tracing::debug!(directory = %directory.display(), error = %e, "Abandoning unreadable subtree");
                exn::bail!(io_error(e, directory))
            },
        }
    }

    async fn visit(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<Visit> {
        let path = entry.path();
        // `DirEntry::metadata` does not traverse symlinks, so a link is
        // neither a file nor a directory here and gets ignored below.
        let metadata = entry.metadata().await.map_err(|e| io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        let within = prefix.is_none_or(|pfx| relative.starts_with(pfx));
        if metadata.is_dir() {
            // A directory above the prefix still has to be entered.
            let above = prefix.is_some_and(|pfx| pfx.starts_with(&relative));
            return Ok(if within || above { Visit::Enter(path) } else { Visit::Ignore });
        }
        if within && metadata.is_file() {
            return Ok(Visit::Yield(file_info(&relative, &metadata)?));
        }
        if within {
            tracing::trace!(path = %path.display(), "Ignoring entry that is neither a file nor a directory");
        }
        Ok(Visit::Ignore)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<()> {
        fs::read_dir(&self.root)
            .await
            .map(drop)
            .map_err(|e| io_error(e, &self.root))
            .or_raise(|| ErrorKind::RootUnavailable(self.name.clone()))
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let prefix = match prefix.map(validate_path).transpose() {
            Ok(prefix) => prefix,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            let mut pending = vec![self.root.clone()];
            while let Some(directory) = pending.pop() {
                let mut entries = match Self::open_dir(&directory).await {
                    Ok(Some(entries)) => entries,
                    Ok(None) => continue,
                    Err(e) => {
                        yield Err(e);
                        continue;
                    },
                };
                loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break,
                        Err(e) => {
                            // Whatever this directory still held is lost.
                            yield Err(exn::Exn::from(io_error(e, &directory)));
                            break;
                        },
                    };
                    match self.visit(entry, prefix.as_deref()).await {
                        Ok(Visit::Yield(info)) => yield Ok(info),
                        Ok(Visit::Enter(directory)) => pending.push(directory),
                        Ok(Visit::Ignore) => {},
                        Err(e) => yield Err(e),
                    }
                }
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let absolute = self.absolute_path(path)?;
        Ok(fs::read(&absolute).await.map_err(|e| io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let absolute = self.absolute_path(path)?;
        self.ensure_parent(&absolute, path).await?;
        Ok(fs::write(&absolute, data).await.map_err(|e| io_error(e, path))?)
    }

    async fn append(&self, path: &Path, data: &[u8]) -> Result<()> {
        let absolute = self.absolute_path(path)?;
        self.ensure_parent(&absolute, path).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&absolute)
            .await
            .map_err(|e| io_error(e, path))?;
        file.write_all(data).await.map_err(|e| io_error(e, path))?;
        Ok(file.flush().await.map_err(|e| io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let absolute = self.absolute_path(path)?;
        Ok(fs::remove_file(&absolute).await.map_err(|e| io_error(e, path))?)
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let source = self.absolute_path(from)?;
        let target = self.absolute_path(to)?;
        self.ensure_parent(&target, to).await?;
        Ok(fs::rename(&source, &target).await.map_err(|e| io_error(e, from))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("photography", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    async fn list(backend: &LocalBackend, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        backend.list_stream(prefix).try_collect().await
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("images/photography");
        LocalBackend::new("name", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("9b1deb4d/metadata.json");
        assert_eq!(backend.absolute_path(Path::new("9b1deb4d/metadata.json")).unwrap(), expected);
        assert_eq!(backend.relative_path(&expected).unwrap(), Path::new("9b1deb4d/metadata.json"));
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
        assert!(backend.relative_path(PathBuf::from("/other/file.json")).is_err());
    }

    #[tokio::test]
    async fn test_write_creates_directories_and_overwrites() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("a/b/metadata.json"), b"first").await.unwrap();
        backend.write(Path::new("a/b/metadata.json"), b"second").await.unwrap();
        assert_eq!(backend.read(Path::new("a/b/metadata.json")).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_delete() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("raw.jpg"), b"data").await.unwrap();
        backend.delete(Path::new("raw.jpg")).await.unwrap();
        let err = backend.read(Path::new("raw.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        let err = backend.delete(Path::new("raw.jpg")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_creates_directories() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new(".staging/x/raw.jpg"), b"data").await.unwrap();
        backend.rename(Path::new(".staging/x/raw.jpg"), Path::new("9b1deb4d/raw.jpg")).await.unwrap();
        assert!(backend.read(Path::new(".staging/x/raw.jpg")).await.is_err());
        assert_eq!(backend.read(Path::new("9b1deb4d/raw.jpg")).await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_append() {
        let (_temp_dir, backend) = backend();
        backend.append(Path::new(".staging/ab12"), b"raw ").await.unwrap();
        backend.append(Path::new(".staging/ab12"), b"bytes").await.unwrap();
        backend.append(Path::new(".staging/ab12"), b"").await.unwrap();
        assert_eq!(backend.read(Path::new(".staging/ab12")).await.unwrap(), b"raw bytes");
        let files = list(&backend, None).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from(".staging/ab12"));
        assert_eq!(files[0].size, 9);
        assert!(backend.append(Path::new("../escape"), b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_check() {
        let (temp_dir, backend) = backend();
        backend.check().await.unwrap();
        drop(temp_dir);
        let err = backend.check().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RootUnavailable(name) if name == "photography"));
    }

    #[tokio::test]
    async fn test_walk_is_recursive() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("one/metadata.json"), b"{}").await.unwrap();
        backend.write(Path::new("one/raw.jpg"), b"raw").await.unwrap();
        backend.write(Path::new("nested/deeper/two/metadata.json"), b"{}").await.unwrap();
        backend.write(Path::new("loose.json"), b"{}").await.unwrap();
        let mut paths: Vec<_> = list(&backend, None).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("loose.json"),
                PathBuf::from("nested/deeper/two/metadata.json"),
                PathBuf::from("one/metadata.json"),
                PathBuf::from("one/raw.jpg"),
            ]
        );
    }

    #[tokio::test]
    async fn test_walk_with_prefix() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("a/sub/metadata.json"), b"{}").await.unwrap();
        backend.write(Path::new("a/subdir/metadata.json"), b"{}").await.unwrap();
        backend.write(Path::new("b/metadata.json"), b"{}").await.unwrap();
        let files = list(&backend, Some(Path::new("a/sub"))).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, Path::new("a/sub/metadata.json"));
        assert!(list(&backend, Some(Path::new("nonexistent"))).await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_walk_skips_symlinks() {
        let (temp_dir, backend) = backend();
        backend.write(Path::new("one/metadata.json"), b"{}").await.unwrap();
        // A link back to the root would loop forever if it were followed.
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("one/loop")).unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("one/metadata.json"),
            temp_dir.path().join("one/alias.json"),
        )
        .unwrap();
        let files = list(&backend, None).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, Path::new("one/metadata.json"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_walk_continues_past_unreadable_directory() {
        use futures::StreamExt;
        use std::os::unix::fs::PermissionsExt;

        let (temp_dir, backend) = backend();
        backend.write(Path::new("locked/metadata.json"), b"{}").await.unwrap();
        backend.write(Path::new("open/metadata.json"), b"{}").await.unwrap();
        let locked = temp_dir.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Root ignores permission bits; nothing to observe in that case.
        if std::fs::read_dir(&locked).is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }
        let results: Vec<_> = backend.list_stream(None).collect().await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        let files: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).map(|f| f.path.clone()).collect();
        let errors = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(files, vec![PathBuf::from("open/metadata.json")]);
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.read(Path::new("etc/../../passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
