//! Gallery Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The reload pipeline has its own,
//! finer-grained kinds in [`reload::error`](crate::reload::error); they end
//! up as children of [`ErrorKind::Reload`] when a run fails outright.

use derive_more::{Display, Error};

/// A gallery error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for gallery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Caller Errors
/// - [`ErrorKind::InvalidInput`]
/// - [`ErrorKind::NotFound`]
/// - [`ErrorKind::ReloadInProgress`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Store`]
/// - [`ErrorKind::Sidecar`]
/// - [`ErrorKind::Reload`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An identity, filename or variant name the caller supplied is unusable.
    #[display("invalid input: {_0}")]
    InvalidInput(#[error(not(source))] String),
    /// No sidecar exists for the given identity.
    #[display("no photo with identity {_0}")]
    NotFound(#[error(not(source))] String),
    /// Another reload holds the lock; try again once it has finished.
    #[display("a reload is already running")]
    ReloadInProgress,
    /// A storage backend operation (read, write, rename, delete) failed.
    #[display("storage backend failure")]
    Storage,
    /// A metadata store query failed.
    #[display("metadata store failure")]
    Store,
    /// A sidecar on disk is not a valid photo record.
    #[display("malformed sidecar")]
    Sidecar,
    /// The reload pipeline could not run to completion.
    #[display("reload failed")]
    Reload,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReloadInProgress | Self::Storage | Self::Store)
    }
}
