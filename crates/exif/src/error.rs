//! EXIF Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An EXIF extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for EXIF extraction.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes are not an image container carrying an EXIF block.
    #[display("no readable EXIF data in image")]
    InvalidImage,
    /// A required tag is absent (or present but empty).
    #[display("missing EXIF field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// A tag is present but its value has the wrong shape.
    #[display("failed to parse EXIF field '{field}', found value: {value}")]
    ParseError {
        /// The field that failed to parse.
        field: &'static str,
        /// The offending value, as the EXIF reader displays it.
        value: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The image either carries the tags or it doesn't.
        false
    }
}
