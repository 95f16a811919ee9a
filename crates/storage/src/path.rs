//! Path validation.
//!
//! Every path handed to a backend is relative to the storage root. These
//! helpers make sure it stays that way, whatever a client put in an upload's
//! filename or a URL segment.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Resolve `path` against the storage root without touching the disk.
///
/// `.` and repeated separators disappear, `..` pops the previous component,
/// and a leading `/` is ignored: the result is always relative. A path that
/// would climb above the root, resolves to nothing, carries a Windows prefix
/// or contains a NUL byte is rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath). Backslashes and
/// non-UTF-8 names pass through untouched.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use shutter_storage::validate_path;
/// assert!(validate_path("9b1deb4d/metadata.json").is_ok());
/// // Climbs out of `9b1deb4d` but never out of the root.
/// assert!(validate_path("9b1deb4d/../raw.jpg").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("wrong/.././9b1deb4d//./raw.jpg/").unwrap(),
///     Path::new("9b1deb4d/raw.jpg")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(path.to_path_buf());
    let mut resolved: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            // Survives `components()` on Unix, truncates in the syscall.
            Component::Normal(name) if name.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(name) => resolved.push(name),
            Component::ParentDir => {
                if resolved.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
        }
    }
    if resolved.is_empty() {
        exn::bail!(invalid());
    }
    Ok(resolved.into_iter().collect())
}

/// Validates a bare file name, as supplied by an uploading client.
///
/// Unlike [`validate`], nothing gets resolved here: the name must already be
/// exactly one normal path component.
///
/// ```
/// use shutter_storage::validate_file_name;
/// assert_eq!(validate_file_name("raw.jpg").unwrap(), "raw.jpg");
/// assert!(validate_file_name("../raw.jpg").is_err());
/// assert!(validate_file_name("a/raw.jpg").is_err());
/// ```
pub fn validate_file_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(s)), None) if !s.as_encoded_bytes().contains(&0) && s == name => Ok(name),
        _ => exn::bail!(ErrorKind::InvalidPath(PathBuf::from(name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("9b1deb4d/metadata.json")).unwrap(), Path::new("9b1deb4d/metadata.json"));
        assert_eq!(validate(Path::new(".staging/ab12/raw.jpg")).unwrap(), Path::new(".staging/ab12/raw.jpg"));
        assert_eq!(validate(Path::new("raw.jpg")).unwrap(), Path::new("raw.jpg"));
    }

    #[test]
    fn test_resolution() {
        let cases = [
            ("9b1deb4d//metadata.json", "9b1deb4d/metadata.json"),
            ("./9b1deb4d/./raw.jpg", "9b1deb4d/raw.jpg"),
            ("/9b1deb4d/raw.jpg", "9b1deb4d/raw.jpg"),
            ("9b1deb4d/raw.jpg/..", "9b1deb4d"),
            (".staging///", ".staging"),
        ];
        for (input, expected) in cases {
            assert_eq!(validate(input).unwrap(), Path::new(expected), "{input}");
        }
    }

    #[test]
    fn test_rejected() {
        for input in ["..", "../metadata.json", "9b1deb4d/../../raw.jpg", "", "/", "./.", "raw\0.jpg"] {
            assert!(validate(input).is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn test_file_names() {
        assert!(validate_file_name("small_thumb.webp").is_ok());
        assert!(validate_file_name("raw.v2.cr3").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name(".").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("/raw.jpg").is_err());
        assert!(validate_file_name("photos/raw.jpg").is_err());
        assert!(validate_file_name("raw.jpg/").is_err());
        assert!(validate_file_name("raw\0.jpg").is_err());
    }
}
