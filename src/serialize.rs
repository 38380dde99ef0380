//! Re-serialization: original entries (pass-through or overlaid) followed by
//! entries that exist only in the overlay.

use crate::error::Result;
use crate::store::EntryStore;
use crate::writer::{CompressionMethod, StreamingZipWriter};
use std::io::{Read, Seek, Write};

/// ODF convention: this entry comes first and is stored uncompressed
pub const MIMETYPE_PATH: &str = "mimetype";

/// Counts from one serialization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    /// Original entries copied from the archive unchanged
    pub passed_through: usize,
    /// Original entries written from the overlay
    pub overlaid: usize,
    /// Entries that did not exist in the original archive
    pub added: usize,
}

impl SaveStats {
    pub fn total(&self) -> usize {
        self.passed_through + self.overlaid + self.added
    }
}

fn method_for(name: &str) -> CompressionMethod {
    if name == MIMETYPE_PATH {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflate
    }
}

/// Write every entry of `store` into `writer` and finish the archive.
///
/// Original entries keep their directory order; added entries follow in name
/// order. Each name is written once.
pub fn write_archive<R, W>(store: &mut EntryStore<R>, writer: W) -> Result<(W, SaveStats)>
where
    R: Read + Seek,
    W: Write + Seek,
{
    let mut zip = StreamingZipWriter::from_writer(writer);
    let mut stats = SaveStats::default();

    let originals: Vec<_> = store.reader().unique_entries().cloned().collect();
    for entry in &originals {
        let method = method_for(&entry.name);
        if let Some(data) = store.overlay_entry(&entry.name) {
            zip.write_entry(&entry.name, method, data)?;
            stats.overlaid += 1;
        } else {
            let data = store.reader_mut().read_entry(entry)?;
            zip.write_entry(&entry.name, method, &data)?;
            stats.passed_through += 1;
        }
    }

    let added: Vec<String> = store.added_names().map(str::to_string).collect();
    for name in &added {
        if let Some(data) = store.overlay_entry(name) {
            zip.write_entry(name, method_for(name), data)?;
            stats.added += 1;
        }
    }

    let output = zip.finish()?;
    log::debug!(
        "wrote {} entries ({} unchanged, {} overlaid, {} added)",
        stats.total(),
        stats.passed_through,
        stats.overlaid,
        stats.added
    );
    Ok((output, stats))
}
