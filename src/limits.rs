//! Resource caps applied to untrusted archives.
//!
//! The constants are the document engine's fixed bounds. [`Limits`] carries
//! them through the reader and the entry store; `Limits::default()` is what
//! every public constructor uses unless a `_with_limits` variant is called.

/// Maximum size of the source archive (100 MiB)
pub const MAX_ARCHIVE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum decompressed size of a single entry (50 MiB)
pub const MAX_ENTRY_SIZE: u64 = 50 * 1024 * 1024;

/// Maximum number of entries in the archive directory
pub const MAX_ENTRIES: u64 = 10_000;

/// Maximum length in bytes of an inserted image name
pub const MAX_IMAGE_NAME_LEN: usize = 255;

/// Size and count caps for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Cap on the whole source, checked before anything is decompressed
    pub max_archive_size: u64,
    /// Cap on each entry, declared and actual
    pub max_entry_size: u64,
    /// Cap on the number of directory records
    pub max_entries: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_archive_size: MAX_ARCHIVE_SIZE,
            max_entry_size: MAX_ENTRY_SIZE,
            max_entries: MAX_ENTRIES,
        }
    }
}

impl Limits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_archive_size(mut self, bytes: u64) -> Self {
        self.max_archive_size = bytes;
        self
    }

    pub fn max_entry_size(mut self, bytes: u64) -> Self {
        self.max_entry_size = bytes;
        self
    }

    pub fn max_entries(mut self, count: u64) -> Self {
        self.max_entries = count;
        self
    }
}
