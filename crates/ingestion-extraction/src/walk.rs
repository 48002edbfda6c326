use std::cmp::Ordering;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::ExtractionError;

/// Lists every regular file under `root`.
///
/// Files are ordered by parent directory first and file name second, so all
/// files of one directory (one class) form a contiguous run. The order is
/// stable across runs on the same tree.
pub fn enumerate_images(root: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|err| ExtractionError::Walk {
            root: root.to_path_buf(),
            reason: err.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| by_directory_then_name(a, b));
    debug!(root = %root.display(), files = files.len(), "enumerated image files");
    Ok(files)
}

fn by_directory_then_name(a: &Path, b: &Path) -> Ordering {
    a.parent()
        .cmp(&b.parent())
        .then_with(|| a.file_name().cmp(&b.file_name()))
}

/// Identifier stored for a file: its path with `/` separators.
#[must_use]
pub fn source_id(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if MAIN_SEPARATOR == '/' {
        raw.into_owned()
    } else {
        raw.replace(MAIN_SEPARATOR, "/")
    }
}
