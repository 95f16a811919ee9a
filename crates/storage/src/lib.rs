//! Storage backends for the photography library.
//!
//! Everything the gallery touches on disk (identity folders, sidecars,
//! uploaded variants and the upload staging area) goes through a
//! [`StorageBackend`], so the pipeline can be exercised against the
//! in-memory `MockBackend` in tests.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::{validate as validate_path, validate_file_name};
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
