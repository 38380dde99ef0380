//! The document facade: open, list tags, replace, add, save.

use crate::content::{FrameLocator, CONTENT_PATH};
use crate::error::{OdtError, Result};
use crate::limits::Limits;
use crate::manifest::{ManifestSync, MANIFEST_PATH};
use crate::media::sniff_image_extension;
use crate::reader::ArchiveReader;
use crate::serialize::{write_archive, SaveStats, MIMETYPE_PATH};
use crate::store::EntryStore;
use crate::validate::{base_name, validate_image_name, validate_path};
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

/// Directory that holds embedded pictures
pub const PICTURES_DIR: &str = "Pictures/";

/// Extension used by [`Document::replace_images`] when the bytes are not a
/// recognized image format
const FALLBACK_EXTENSION: &str = ".png";

/// Outcome of [`Document::replace_images`]
#[derive(Debug, Default)]
pub struct ReplaceReport {
    /// Tags whose image was replaced, in request order
    pub replaced: Vec<String>,
    /// Tags that failed, with the reason
    pub failed: Vec<(String, OdtError)>,
}

impl ReplaceReport {
    /// True when every requested tag was replaced
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// An OpenDocument file opened for image replacement.
///
/// Holds the original archive index and an overlay of pending edits. Nothing
/// is written anywhere until [`Document::save`] or [`Document::save_to_bytes`].
/// One instance must not be shared between threads for mutation.
pub struct Document<R: Read + Seek = Cursor<Vec<u8>>> {
    store: EntryStore<R>,
    frames: FrameLocator,
    manifest: ManifestSync,
}

impl Document<File> {
    /// Open a document from disk with the default limits
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_limits(path, Limits::default())
    }

    pub fn open_with_limits<P: AsRef<Path>>(path: P, limits: Limits) -> Result<Self> {
        let path = path.as_ref();
        validate_path(&path.to_string_lossy())?;

        log::debug!("opening {}", path.display());
        Self::from_reader(ArchiveReader::open(path, limits)?)
    }
}

impl Document<Cursor<Vec<u8>>> {
    /// Open a document held in memory with the default limits
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_limits(bytes, Limits::default())
    }

    pub fn from_bytes_with_limits(bytes: Vec<u8>, limits: Limits) -> Result<Self> {
        Self::from_reader(ArchiveReader::new(Cursor::new(bytes), limits)?)
    }
}

impl<R: Read + Seek> Document<R> {
    /// Wrap an already indexed archive
    pub fn from_reader(reader: ArchiveReader<R>) -> Result<Self> {
        Ok(Self {
            store: EntryStore::new(reader),
            frames: FrameLocator::new()?,
            manifest: ManifestSync::new()?,
        })
    }

    pub fn limits(&self) -> Limits {
        *self.store.reader().limits()
    }

    /// Names of all entries that a save would write: original entries in
    /// directory order, then added entries
    pub fn entry_names(&self) -> Vec<String> {
        self.store.names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.store.contains(name)
    }

    /// Current bytes of an entry, edited or original
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        self.store.get(name).map(|data| data.into_owned())
    }

    /// Decompress every original entry into memory up front.
    ///
    /// Any entry over the limits fails the whole call. Returns the number of
    /// entries loaded.
    pub fn load_all(&mut self) -> Result<usize> {
        self.store.load_all()
    }

    /// Tags (`draw:name` of image frames) in document order, without duplicates
    pub fn find_image_tags(&mut self) -> Result<Vec<String>> {
        let content = self.content_text()?;
        Ok(self.frames.find_tags(&content))
    }

    /// Image reference currently used by the first frame tagged `tag`
    pub fn image_href(&mut self, tag: &str) -> Result<Option<String>> {
        let content = self.content_text()?;
        Ok(self.frames.href_of(&content, tag))
    }

    /// Point the frame tagged `tag` at `new_image_path` and store the image
    /// there.
    ///
    /// The content part, the manifest and the image are committed together;
    /// on any error none of them changes.
    pub fn replace_image_by_tag(
        &mut self,
        tag: &str,
        new_image_path: &str,
        image_data: Vec<u8>,
    ) -> Result<()> {
        self.check_image(new_image_path, &image_data)?;

        let content = self.content_text()?;
        let new_content = self.frames.replace_href(&content, tag, new_image_path)?;

        let mut staged = vec![(CONTENT_PATH.to_string(), new_content.into_bytes())];
        if let Some(manifest) = self.synced_manifest(new_image_path)? {
            staged.push((MANIFEST_PATH.to_string(), manifest.into_bytes()));
        }
        staged.push((new_image_path.to_string(), image_data));

        self.store.set_all(staged)?;
        log::debug!("replaced image for tag {:?} with {}", tag, new_image_path);
        Ok(())
    }

    /// Add (or overwrite) an image at `image_path` and list it in the manifest
    pub fn add_image(&mut self, image_path: &str, image_data: Vec<u8>) -> Result<()> {
        self.check_image(image_path, &image_data)?;

        let mut staged = vec![(image_path.to_string(), image_data)];
        if let Some(manifest) = self.synced_manifest(image_path)? {
            staged.push((MANIFEST_PATH.to_string(), manifest.into_bytes()));
        }

        self.store.set_all(staged)?;
        log::debug!("added {}", image_path);
        Ok(())
    }

    /// Add an image named `name` under the pictures directory.
    ///
    /// Returns the entry path it was stored at.
    pub fn add_picture(&mut self, name: &str, image_data: Vec<u8>) -> Result<String> {
        validate_image_name(name)?;
        let path = format!("{}{}", PICTURES_DIR, name);
        self.add_image(&path, image_data)?;
        Ok(path)
    }

    /// Replace several tagged images.
    ///
    /// Each image is stored as `Pictures/{tag}{ext}`, the extension sniffed
    /// from its bytes (`.png` when unknown). A failing tag is reported and
    /// does not stop the others.
    pub fn replace_images<I, S>(&mut self, images: I) -> ReplaceReport
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        let mut report = ReplaceReport::default();

        for (tag, data) in images {
            let tag = tag.into();
            let ext = sniff_image_extension(&data).unwrap_or(FALLBACK_EXTENSION);
            let path = format!("{}{}{}", PICTURES_DIR, tag, ext);

            match self.replace_image_by_tag(&tag, &path, data) {
                Ok(()) => report.replaced.push(tag),
                Err(err) => {
                    log::warn!("could not replace image for tag {:?}: {}", tag, err);
                    report.failed.push((tag, err));
                }
            }
        }

        report
    }

    /// Write the document to `output_path`
    pub fn save<P: AsRef<Path>>(&mut self, output_path: P) -> Result<SaveStats> {
        let output_path = output_path.as_ref();
        validate_path(&output_path.to_string_lossy())?;

        let (buffer, stats) = self.save_to_writer(Cursor::new(Vec::new()))?;
        write_output_file(output_path, buffer.get_ref())?;

        log::debug!("saved {} entries to {}", stats.total(), output_path.display());
        Ok(stats)
    }

    /// Serialize the document into a new buffer
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>> {
        let (buffer, _) = self.save_to_writer(Cursor::new(Vec::new()))?;
        Ok(buffer.into_inner())
    }

    /// Serialize the document into any seekable sink
    pub fn save_to_writer<W: Write + Seek>(&mut self, writer: W) -> Result<(W, SaveStats)> {
        write_archive(&mut self.store, writer)
    }

    fn content_text(&mut self) -> Result<String> {
        let bytes = match self.store.get(CONTENT_PATH) {
            Ok(data) => data.into_owned(),
            Err(OdtError::EntryNotFound(_)) => return Err(OdtError::ContentNotFound),
            Err(err) => return Err(err),
        };
        String::from_utf8(bytes)
            .map_err(|_| OdtError::InvalidFormat(format!("{} is not valid UTF-8", CONTENT_PATH)))
    }

    /// Manifest text with a record for `path`, or `None` if already listed
    fn synced_manifest(&mut self, path: &str) -> Result<Option<String>> {
        let bytes = match self.store.get(MANIFEST_PATH) {
            Ok(data) => data.into_owned(),
            Err(OdtError::EntryNotFound(_)) => return Err(OdtError::ManifestNotFound),
            Err(err) => return Err(err),
        };
        let manifest = String::from_utf8(bytes).map_err(|_| {
            OdtError::InvalidFormat(format!("{} is not valid UTF-8", MANIFEST_PATH))
        })?;
        self.manifest.ensure_file_entry(&manifest, path)
    }

    /// Payload and path checks shared by replace and add; runs before any read
    fn check_image(&self, path: &str, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(OdtError::EmptyEntry(path.to_string()));
        }

        let limit = self.limits().max_entry_size;
        if data.len() as u64 > limit {
            return Err(OdtError::too_large(path, data.len() as u64, limit));
        }

        validate_path(path)?;
        validate_image_name(base_name(path))?;

        if [CONTENT_PATH, MANIFEST_PATH, MIMETYPE_PATH].contains(&path) {
            return Err(OdtError::InvalidPath {
                path: path.to_string(),
                reason: "reserved document part",
            });
        }

        Ok(())
    }
}

/// Write the finished archive with owner read/write, group/other read.
///
/// The mode is applied after writing, so an existing destination with wider
/// permissions is narrowed as well.
fn write_output_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    Ok(())
}
