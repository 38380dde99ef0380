//! Lazy entry store: an overlay of edited entries over the original archive.
//!
//! Overlay entries supersede the original entry of the same name or add a new
//! one. Anything not in the overlay is decompressed from the archive on each
//! read and not cached.

use crate::error::{OdtError, Result};
use crate::reader::ArchiveReader;
use crate::validate::validate_path;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Seek};

pub struct EntryStore<R: Read + Seek> {
    reader: ArchiveReader<R>,
    overlay: BTreeMap<String, Vec<u8>>,
}

impl<R: Read + Seek> EntryStore<R> {
    pub fn new(reader: ArchiveReader<R>) -> Self {
        Self {
            reader,
            overlay: BTreeMap::new(),
        }
    }

    pub fn reader(&self) -> &ArchiveReader<R> {
        &self.reader
    }

    /// Overlay content if present, else the original entry decompressed
    /// through the bounded reader
    pub fn get(&mut self, name: &str) -> Result<Cow<'_, [u8]>> {
        validate_path(name)?;

        if self.overlay.contains_key(name) {
            return Ok(Cow::Borrowed(&self.overlay[name]));
        }

        log::debug!("loading original entry {}", name);
        self.reader.read_entry_by_name(name).map(Cow::Owned)
    }

    /// Replace or create an overlay entry
    pub fn set(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        self.check_entry(name, &data)?;
        self.check_capacity(usize::from(!self.contains(name)))?;
        self.overlay.insert(name.to_string(), data);
        Ok(())
    }

    /// Insert several entries, all or none: every entry is checked before the
    /// first one is inserted
    pub fn set_all(&mut self, staged: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut new_names = HashSet::new();
        for (name, data) in &staged {
            self.check_entry(name, data)?;
            if !self.contains(name) {
                new_names.insert(name.as_str());
            }
        }
        self.check_capacity(new_names.len())?;
        self.overlay.extend(staged);
        Ok(())
    }

    /// Materialize every original entry not yet in the overlay.
    ///
    /// Returns the number of entries loaded. On failure the overlay is left
    /// as it was.
    pub fn load_all(&mut self) -> Result<usize> {
        let pending: Vec<_> = self
            .reader
            .unique_entries()
            .filter(|e| !self.overlay.contains_key(&e.name))
            .cloned()
            .collect();

        let mut loaded = Vec::with_capacity(pending.len());
        for entry in &pending {
            let data = self.reader.read_entry(entry)?;
            loaded.push((entry.name.clone(), data));
        }

        let count = loaded.len();
        self.overlay.extend(loaded);
        log::debug!("materialized {} entries", count);
        Ok(count)
    }

    /// True when the name exists in the overlay or the original archive
    pub fn contains(&self, name: &str) -> bool {
        self.overlay.contains_key(name) || self.reader.contains(name)
    }

    /// True when the name is held in the overlay
    pub fn in_overlay(&self, name: &str) -> bool {
        self.overlay.contains_key(name)
    }

    /// Number of entries a save would write
    pub fn len(&self) -> usize {
        self.reader.unique_entries().count() + self.added_names().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overlay entries absent from the original archive, in name order
    pub fn added_names(&self) -> impl Iterator<Item = &str> {
        self.overlay
            .keys()
            .filter(|name| !self.reader.contains(name))
            .map(String::as_str)
    }

    /// Original names in directory order (first occurrence), then added names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .reader
            .unique_entries()
            .map(|e| e.name.clone())
            .collect();
        names.extend(self.added_names().map(str::to_string));
        names
    }

    pub(crate) fn overlay_entry(&self, name: &str) -> Option<&[u8]> {
        self.overlay.get(name).map(Vec::as_slice)
    }

    pub(crate) fn reader_mut(&mut self) -> &mut ArchiveReader<R> {
        &mut self.reader
    }

    /// The saved archive must reopen under the same entry cap
    fn check_capacity(&self, new_entries: usize) -> Result<()> {
        if new_entries == 0 {
            return Ok(());
        }

        let count = (self.len() + new_entries) as u64;
        let limit = self.reader.limits().max_entries;
        if count > limit {
            return Err(OdtError::TooManyEntries { count, limit });
        }
        Ok(())
    }

    fn check_entry(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_path(name)?;

        if data.is_empty() {
            return Err(OdtError::EmptyEntry(name.to_string()));
        }

        let limit = self.reader.limits().max_entry_size;
        if data.len() as u64 > limit {
            return Err(OdtError::too_large(name, data.len() as u64, limit));
        }

        Ok(())
    }
}
