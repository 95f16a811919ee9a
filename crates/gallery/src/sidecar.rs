//! Metadata sidecars: the `<id>/metadata.json` files that are the source of
//! truth for every photo record.

use crate::error::{ErrorKind, Result};
use crate::models::PhotoRecord;
use exn::ResultExt;
use std::path::{Component, Path, PathBuf};

/// File name of the sidecar written into every identity folder.
pub const SIDECAR_NAME: &str = "metadata.json";
/// Directory (relative to the storage root) that uploads land in before
/// they're authorized. Never walked.
pub const STAGING_DIR: &str = ".staging";

const EXTENSION: &str = ".json";

/// Path of the sidecar for the photo with the given identity.
pub fn sidecar_path(id: &str) -> PathBuf {
    Path::new(id).join(SIDECAR_NAME)
}

/// Whether the walker should treat `path` as a sidecar.
///
/// The file name must end in `.json` (any case) and be longer than the
/// extension alone, so a file called just `.json` is ignored. Anything under
/// the staging directory is ignored regardless of its name.
pub fn is_sidecar(path: &Path) -> bool {
    if let Some(Component::Normal(first)) = path.components().next()
        && first == STAGING_DIR
    {
        return false;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.len() > EXTENSION.len()
        && name.get(name.len() - EXTENSION.len()..).is_some_and(|ext| ext.eq_ignore_ascii_case(EXTENSION))
}

/// Parse sidecar bytes into a record.
///
/// Requires a JSON object with a string `id` and an object `tags`; anything
/// else is [`ErrorKind::Sidecar`].
pub fn parse(bytes: &[u8]) -> Result<PhotoRecord> {
    serde_json::from_slice(bytes).or_raise(|| ErrorKind::Sidecar)
}

/// Serialize a record for writing back to its sidecar.
pub fn serialize(record: &PhotoRecord) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(record).or_raise(|| ErrorKind::Sidecar)
}
