//! Locating the concrete file behind a possibly extension-less object path.

use crate::format::Format;
use std::path::{Path, PathBuf};

/// True iff the path is non-empty and carries a registered object extension,
/// regardless of whether anything exists on disk.
pub fn is_object_path<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    !path.as_os_str().is_empty() && Format::from_path(path).is_some()
}

/// Find the object file a path refers to.
///
/// A path that already carries a registered extension and names an existing
/// regular file resolves to itself. Otherwise each registered extension is
/// appended in [`Format::RESOLUTION_ORDER`] and the first existing regular
/// file wins. Directories never resolve, even with a recognized extension.
/// Empty input resolves to `None`, never an error.
pub fn resolve<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return None;
    }
    if Format::from_path(path).is_some() && path.is_file() {
        return Some(path.to_path_buf());
    }
    for ext in Format::RESOLUTION_ORDER {
        let mut candidate = path.as_os_str().to_os_string();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
