//! SQLite-backed storage for the site backend.
//!
//! Two concerns share one database file:
//! - the `photography` document collections: `photos` (one JSON document per
//!   photo, keyed by its identity) and `tags` (the flushed tag index), see
//!   [`Photos`];
//! - the request/event log tables written by the logging sink, see
//!   [`Journal`].
//!
//! The collections are not the source of truth: the sidecar files in the
//! photography directory are. A reload rebuilds them from scratch.

mod db;
pub mod error;
mod journal;
mod photos;

pub use crate::db::Database;
pub use crate::journal::{AccessEntry, Journal, LogEntry, timestamp};
pub use crate::photos::{Document, Photos};
