//! Folder-to-database reload.
//!
//! Walks the whole storage tree, treats every file that looks like a sidecar
//! (see [`is_sidecar`](crate::sidecar::is_sidecar)) as a photo record,
//! enriches it with the EXIF data of its `raw` variant and upserts it into
//! the `photos` collection. Every tag name seen on the way ends up in a
//! single [`TagIndex`](crate::models::TagIndex) document that replaces the
//! contents of the `tags` collection once the walk is over.
//!
//! The primary entry point is [`reload`], a stream of [`ReloadEvent`]s. The
//! [`Gallery`](crate::Gallery) wraps it with the lock that keeps two runs
//! from overlapping.

mod enrich;
pub mod error;
mod stream;

pub use self::stream::{DEFAULT_CONCURRENCY, ReloadEvent, ReloadMode, ReloadOptions, ReloadSummary, Reloaded, reload};
