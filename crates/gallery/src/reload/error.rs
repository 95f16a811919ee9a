//! Error types for the [`reload`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A reload error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a reload failure.
///
/// ### Fatal Errors
/// These end the run; no [`Complete`](super::ReloadEvent::Complete) follows.
/// - [`ErrorKind::Root`]
/// - [`ErrorKind::Rebuild`]
/// - [`ErrorKind::Flush`]
///
/// ### Per-File Errors
/// These are reported as [`Skipped`](super::ReloadEvent::Skipped) and the run
/// carries on.
/// - [`ErrorKind::Walk`]
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Sidecar`]
/// - [`ErrorKind::Store`]
///
/// ### Enrichment Errors
/// Never skip a file: the record is still upserted, just without EXIF fields.
/// - [`ErrorKind::MissingVariant`]
/// - [`ErrorKind::Exif`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The storage root itself cannot be enumerated.
    #[display("storage root is not readable")]
    Root,
    /// Dropping and recreating the collections failed.
    #[display("could not rebuild the photo collections")]
    Rebuild,
    /// Writing the tag index failed.
    #[display("could not flush the tag index")]
    Flush,
    /// A directory below the root could not be read; its subtree was skipped.
    #[display("directory could not be walked")]
    Walk,
    /// Reading or rewriting a sidecar, or reading a variant, failed.
    #[display("storage backend failure")]
    Storage,
    /// The sidecar is not a valid photo record.
    #[display("malformed sidecar")]
    Sidecar,
    /// The record could not be upserted.
    #[display("metadata store failure")]
    Store,
    /// The record does not name the variant enrichment reads from.
    #[display("record has no `{_0}` variant")]
    MissingVariant(#[error(not(source))] &'static str),
    /// The variant carries no usable EXIF data.
    #[display("EXIF extraction failed")]
    Exif,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Walk | Self::Storage | Self::Store)
    }
}
