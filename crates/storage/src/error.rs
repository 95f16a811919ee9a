//! Storage Error Types
//!
//! Errors are `exn` trees: a backend raises one of these kinds, callers in
//! the gallery raise their own kind on top with `or_raise`.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong with a storage operation, from the caller's side.
///
/// Paths are relative to the storage root unless the root itself is at
/// fault.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No file at this path. Ingestion relies on telling this apart: a
    /// missing sidecar means an unknown identity.
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The path would escape the storage root, or isn't a usable filename.
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// A walk produced a path that doesn't belong under the root.
    #[display("{} is outside the storage root", _0.display())]
    OutsideRoot(#[error(not(source))] PathBuf),
    /// The named backend's root cannot be enumerated; a reload stops here.
    #[display("storage root of `{_0}` is unavailable")]
    RootUnavailable(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::RootUnavailable(_))
    }
}
