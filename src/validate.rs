//! Path and image-name checks run before anything touches the filesystem or
//! the archive.

use crate::error::{OdtError, Result};
use crate::limits::MAX_IMAGE_NAME_LEN;

const PARENT_DIR: &str = "..";

/// Check a document path (source, destination, or entry path).
///
/// Rejects empty strings and anything containing `..`. Absolute and relative
/// paths are both accepted.
pub fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(OdtError::InvalidPath {
            path: String::new(),
            reason: "empty path",
        });
    }

    if path.contains(PARENT_DIR) {
        return Err(OdtError::InvalidPath {
            path: path.to_string(),
            reason: "path traversal detected",
        });
    }

    Ok(())
}

/// Check an inserted image name. It must be one flat segment: the caller
/// prefixes it with the pictures directory.
pub fn validate_image_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "empty name"
    } else if name.contains(PARENT_DIR) || name.contains('/') || name.contains('\\') {
        "invalid characters in name"
    } else if name.len() > MAX_IMAGE_NAME_LEN {
        "name too long"
    } else {
        return Ok(());
    };

    Err(OdtError::InvalidImageName {
        name: name.to_string(),
        reason,
    })
}

/// Last `/`-separated segment of an entry path
pub(crate) fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
