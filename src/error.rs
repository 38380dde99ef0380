//! Error types for odt-image-replacer

use std::io;
use thiserror::Error;

/// Result type for document operations
pub type Result<T> = std::result::Result<T, OdtError>;

/// Name used in [`OdtError::FileTooLarge`] when the whole archive is over the cap
pub const ARCHIVE_SCOPE: &str = "<archive>";

/// Error types that can occur while opening, editing or saving a document
#[derive(Debug, Error)]
pub enum OdtError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Empty path or path containing a parent-directory segment
    #[error("invalid or unsafe path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// Image name that is not a single safe file name
    #[error("invalid image name {name:?}: {reason}")]
    InvalidImageName { name: String, reason: &'static str },

    /// Archive or entry exceeds its size cap
    #[error("{name} is {size} bytes (max: {limit})")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// Archive directory lists more entries than allowed
    #[error("too many entries in archive: {count} (max: {limit})")]
    TooManyEntries { count: u64, limit: u64 },

    /// Invalid ZIP or document structure
    #[error("invalid document format: {0}")]
    InvalidFormat(String),

    /// Entry uses a compression method the reader does not handle
    #[error("unsupported compression method {method} for entry {name}")]
    UnsupportedCompression { name: String, method: u16 },

    /// Entry not found in the archive or overlay
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Attempt to store an empty payload
    #[error("data for {0} cannot be empty")]
    EmptyEntry(String),

    /// `content.xml` is missing
    #[error("content.xml not found in document")]
    ContentNotFound,

    /// `META-INF/manifest.xml` is missing
    #[error("META-INF/manifest.xml not found in document")]
    ManifestNotFound,

    /// No frame carries the requested tag
    #[error("image with tag {0:?} not found")]
    TagNotFound(String),

    /// A tag-scoped pattern failed to compile
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl OdtError {
    pub(crate) fn too_large(name: impl Into<String>, size: u64, limit: u64) -> Self {
        OdtError::FileTooLarge {
            name: name.into(),
            size,
            limit,
        }
    }

    /// True for the size-cap family of errors (archive or entry level)
    pub fn is_size_limit(&self) -> bool {
        matches!(
            self,
            OdtError::FileTooLarge { .. } | OdtError::TooManyEntries { .. }
        )
    }
}
