//! Bounded ZIP reader - indexes the central directory without loading entry bodies
//!
//! Every entry body is decompressed on demand and only through a hard length
//! limiter, so an archive that lies about its sizes cannot make the reader
//! allocate more than the per-entry cap plus one byte.

use crate::error::{OdtError, Result, ARCHIVE_SCOPE};
use crate::limits::Limits;
use crate::validate::validate_path;
use flate2::read::DeflateDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// ZIP local file header signature
const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP central directory signature
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// ZIP64 end of central directory record signature
const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;

/// Largest span at the end of a file that can hold the EOCD (comment + record)
const EOCD_SEARCH_SPAN: u64 = 65557;

pub(crate) const METHOD_STORED: u16 = 0;
pub(crate) const METHOD_DEFLATE: u16 = 8;

/// Entry in the ZIP central directory
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    pub offset: u64,
}

/// ZIP reader over any seekable source, enforcing [`Limits`]
pub struct ArchiveReader<R: Read + Seek> {
    source: BufReader<R>,
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
    limits: Limits,
}

impl ArchiveReader<File> {
    /// Open a ZIP file, refusing it before reading if it is over the archive cap
    pub fn open<P: AsRef<Path>>(path: P, limits: Limits) -> Result<Self> {
        let size = std::fs::metadata(path.as_ref())?.len();
        if size > limits.max_archive_size {
            return Err(OdtError::too_large(
                ARCHIVE_SCOPE,
                size,
                limits.max_archive_size,
            ));
        }

        Self::new(File::open(path)?, limits)
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Index the central directory of `source`
    pub fn new(source: R, limits: Limits) -> Result<Self> {
        let mut source = BufReader::new(source);

        let size = source.seek(SeekFrom::End(0))?;
        if size > limits.max_archive_size {
            return Err(OdtError::too_large(
                ARCHIVE_SCOPE,
                size,
                limits.max_archive_size,
            ));
        }

        let entries = Self::read_central_directory(&mut source, size, &limits)
            .map_err(|err| malformed(err, "central directory"))?;

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            // First record wins when an archive repeats a name
            index.entry(entry.name.clone()).or_insert(i);
        }

        log::debug!("indexed {} archive entries ({} bytes)", entries.len(), size);

        Ok(ArchiveReader {
            source,
            entries,
            index,
            limits,
        })
    }

    /// Get list of all entries in directory order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Entries in directory order, skipping later records that repeat a name
    pub fn unique_entries(&self) -> impl Iterator<Item = &ArchiveEntry> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(i, e)| self.index.get(&e.name) == Some(i))
            .map(|(_, e)| e)
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Read an entry's decompressed data, bounded by the per-entry cap
    ///
    /// The declared size is checked before any byte is read, decompression
    /// runs through a `cap + 1` limiter, and the actual length is checked
    /// again afterwards. The result must match the declared size and CRC;
    /// nothing is returned for an entry that fails any check.
    pub fn read_entry(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        validate_path(&entry.name)?;

        let limit = self.limits.max_entry_size;
        if entry.uncompressed_size > limit {
            return Err(OdtError::too_large(
                entry.name.as_str(),
                entry.uncompressed_size,
                limit,
            ));
        }

        self.seek_to_data(entry)
            .map_err(|err| malformed(err, &entry.name))?;

        let compressed = (&mut self.source).take(entry.compressed_size);
        let mut data = Vec::with_capacity(entry.uncompressed_size as usize);

        match entry.compression_method {
            METHOD_DEFLATE => {
                DeflateDecoder::new(compressed)
                    .take(limit + 1)
                    .read_to_end(&mut data)
                    .map_err(|err| malformed(err.into(), &entry.name))?;
            }
            METHOD_STORED => {
                compressed
                    .take(limit + 1)
                    .read_to_end(&mut data)
                    .map_err(|err| malformed(err.into(), &entry.name))?;
            }
            method => {
                return Err(OdtError::UnsupportedCompression {
                    name: entry.name.clone(),
                    method,
                })
            }
        }

        if data.len() as u64 > limit {
            return Err(OdtError::too_large(
                entry.name.as_str(),
                data.len() as u64,
                limit,
            ));
        }

        if data.len() as u64 != entry.uncompressed_size {
            return Err(OdtError::InvalidFormat(format!(
                "entry {} declares {} bytes but holds {}",
                entry.name,
                entry.uncompressed_size,
                data.len()
            )));
        }

        if crc32fast::hash(&data) != entry.crc32 {
            return Err(OdtError::InvalidFormat(format!(
                "CRC mismatch in entry {}",
                entry.name
            )));
        }

        Ok(data)
    }

    /// Read an entry by name
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| OdtError::EntryNotFound(name.to_string()))?
            .clone();

        self.read_entry(&entry)
    }

    /// Position the source at the first byte of an entry's compressed data
    fn seek_to_data(&mut self, entry: &ArchiveEntry) -> Result<()> {
        self.source.seek(SeekFrom::Start(entry.offset))?;

        let signature = read_u32_le(&mut self.source)?;
        if signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(OdtError::InvalidFormat(format!(
                "invalid local file header signature for {}",
                entry.name
            )));
        }

        // Skip version, flags, compression method, time, date, CRC-32, sizes;
        // the central directory is authoritative for all of them
        self.source.seek(SeekFrom::Current(22))?;

        let filename_len = read_u16_le(&mut self.source)? as i64;
        let extra_len = read_u16_le(&mut self.source)? as i64;

        self.source
            .seek(SeekFrom::Current(filename_len + extra_len))?;

        Ok(())
    }

    /// Read the central directory, refusing it if it lists too many entries
    fn read_central_directory(
        source: &mut BufReader<R>,
        size: u64,
        limits: &Limits,
    ) -> Result<Vec<ArchiveEntry>> {
        let eocd_offset = Self::find_eocd(source, size)?;

        source.seek(SeekFrom::Start(eocd_offset))?;

        let signature = read_u32_le(source)?;
        if signature != END_OF_CENTRAL_DIRECTORY_SIGNATURE {
            return Err(OdtError::InvalidFormat(format!(
                "invalid end of central directory signature: 0x{:08x}",
                signature
            )));
        }

        // Skip disk number fields (4 bytes)
        source.seek(SeekFrom::Current(4))?;

        let _entries_on_disk = read_u16_le(source)?;

        // These values may be placeholder 0xFFFF/0xFFFFFFFF when ZIP64 is used
        let total_entries_16 = read_u16_le(source)?;
        let cd_size_32 = read_u32_le(source)?;
        let cd_offset_32 = read_u32_le(source)? as u64;

        let mut total_entries = total_entries_16 as u64;
        let mut cd_offset = cd_offset_32;

        if total_entries_16 == 0xFFFF || cd_size_32 == 0xFFFFFFFF || cd_offset_32 == 0xFFFFFFFF {
            let (zip64_total_entries, zip64_cd_offset) = Self::read_zip64_eocd(source, eocd_offset)?;
            total_entries = zip64_total_entries;
            cd_offset = zip64_cd_offset;
        }

        if total_entries > limits.max_entries {
            return Err(OdtError::TooManyEntries {
                count: total_entries,
                limit: limits.max_entries,
            });
        }

        if cd_offset >= size && total_entries > 0 {
            return Err(OdtError::InvalidFormat(format!(
                "central directory offset {} beyond end of archive",
                cd_offset
            )));
        }

        source.seek(SeekFrom::Start(cd_offset))?;

        let mut entries = Vec::with_capacity(total_entries as usize);
        for _ in 0..total_entries {
            let signature = read_u32_le(source)?;
            if signature != CENTRAL_DIRECTORY_SIGNATURE {
                return Err(OdtError::InvalidFormat(format!(
                    "central directory truncated after {} of {} entries",
                    entries.len(),
                    total_entries
                )));
            }

            entries.push(Self::read_directory_record(source)?);
        }

        Ok(entries)
    }

    /// Parse one central directory record; the signature is already consumed
    fn read_directory_record(source: &mut BufReader<R>) -> Result<ArchiveEntry> {
        // Skip version made by, version needed, flags
        source.seek(SeekFrom::Current(6))?;

        let compression_method = read_u16_le(source)?;

        // Skip modification time and date
        source.seek(SeekFrom::Current(4))?;

        let crc32 = read_u32_le(source)?;

        // Sizes are 32-bit placeholders when 0xFFFFFFFF (ZIP64)
        let compressed_size_32 = read_u32_le(source)? as u64;
        let uncompressed_size_32 = read_u32_le(source)? as u64;
        let filename_len = read_u16_le(source)? as usize;
        let extra_len = read_u16_le(source)? as usize;
        let comment_len = read_u16_le(source)? as usize;

        // Skip disk number, internal attributes, external attributes
        source.seek(SeekFrom::Current(8))?;

        let offset_32 = read_u32_le(source)? as u64;

        let mut filename_buf = vec![0u8; filename_len];
        source.read_exact(&mut filename_buf)?;
        let name = String::from_utf8(filename_buf).map_err(|err| {
            OdtError::InvalidFormat(format!(
                "entry name is not valid UTF-8: {:?}",
                String::from_utf8_lossy(err.as_bytes())
            ))
        })?;

        let mut extra_buf = vec![0u8; extra_len];
        if extra_len > 0 {
            source.read_exact(&mut extra_buf)?;
        }

        let mut compressed_size = compressed_size_32;
        let mut uncompressed_size = uncompressed_size_32;
        let mut offset = offset_32;

        if compressed_size_32 == 0xFFFFFFFF
            || uncompressed_size_32 == 0xFFFFFFFF
            || offset_32 == 0xFFFFFFFF
        {
            if let Some(zip64) = find_extra_field(&extra_buf, 0x0001) {
                // Values appear in order, and only when their placeholder is set:
                // original size, compressed size, relative header offset
                let mut fields = zip64.chunks_exact(8).map(le_u64);
                if uncompressed_size_32 == 0xFFFFFFFF {
                    uncompressed_size = fields.next().unwrap_or(uncompressed_size);
                }
                if compressed_size_32 == 0xFFFFFFFF {
                    compressed_size = fields.next().unwrap_or(compressed_size);
                }
                if offset_32 == 0xFFFFFFFF {
                    offset = fields.next().unwrap_or(offset);
                }
            }
        }

        if comment_len > 0 {
            source.seek(SeekFrom::Current(comment_len as i64))?;
        }

        Ok(ArchiveEntry {
            name,
            compressed_size,
            uncompressed_size,
            compression_method,
            crc32,
            offset,
        })
    }

    /// Find and read the ZIP64 EOCD locator and record.
    /// Returns (total entries, central directory offset).
    fn read_zip64_eocd(source: &mut BufReader<R>, eocd_offset: u64) -> Result<(u64, u64)> {
        let search_start = eocd_offset.saturating_sub(EOCD_SEARCH_SPAN);
        source.seek(SeekFrom::Start(search_start))?;
        let mut buffer = vec![0u8; (eocd_offset - search_start) as usize];
        source.read_exact(&mut buffer)?;

        let locator_pos = rfind_signature(&buffer, [0x50, 0x4b, 0x06, 0x07])
            .filter(|pos| pos + 16 <= buffer.len())
            .ok_or_else(|| OdtError::InvalidFormat("ZIP64 EOCD locator not found".to_string()))?;

        // locator: signature(4), disk(4), relative offset of the zip64 eocd(8), disks(4)
        let zip64_eocd_offset = le_u64(&buffer[locator_pos + 8..locator_pos + 16]);

        source.seek(SeekFrom::Start(zip64_eocd_offset))?;

        let sig = read_u32_le(source)?;
        if sig != ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE {
            return Err(OdtError::InvalidFormat(format!(
                "invalid ZIP64 EOCD signature: 0x{:08x}",
                sig
            )));
        }

        // record size(8), version made by(2), version needed(2), disk(4), cd disk(4)
        source.seek(SeekFrom::Current(20))?;

        // entries on this disk(8), then total entries(8)
        let _entries_on_disk = read_u64_le(source)?;
        let total_entries = read_u64_le(source)?;
        let _cd_size = read_u64_le(source)?;
        let cd_offset = read_u64_le(source)?;

        Ok((total_entries, cd_offset))
    }

    /// Find the end of central directory record by scanning back from the end
    fn find_eocd(source: &mut BufReader<R>, size: u64) -> Result<u64> {
        let search_start = size.saturating_sub(EOCD_SEARCH_SPAN);
        source.seek(SeekFrom::Start(search_start))?;

        let mut buffer = Vec::with_capacity((size - search_start) as usize);
        source.read_to_end(&mut buffer)?;

        rfind_signature(&buffer, [0x50, 0x4b, 0x05, 0x06])
            .map(|i| search_start + i as u64)
            .ok_or_else(|| {
                OdtError::InvalidFormat("end of central directory not found".to_string())
            })
    }
}

/// Turn I/O errors that mean "the bytes are wrong" into `InvalidFormat`.
///
/// Short reads and corrupt compressed streams are structural defects of the
/// archive, not failures of the underlying source.
fn malformed(err: OdtError, what: &str) -> OdtError {
    match err {
        OdtError::Io(io_err)
            if matches!(
                io_err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::InvalidInput
                    | io::ErrorKind::InvalidData
            ) =>
        {
            OdtError::InvalidFormat(format!("{} is malformed: {}", what, io_err))
        }
        other => other,
    }
}

fn rfind_signature(buffer: &[u8], signature: [u8; 4]) -> Option<usize> {
    buffer.windows(4).rposition(|w| w == signature)
}

fn find_extra_field(extra: &[u8], wanted: u16) -> Option<&[u8]> {
    let mut i = 0usize;
    while i + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[i], extra[i + 1]]);
        let data_len = u16::from_le_bytes([extra[i + 2], extra[i + 3]]) as usize;
        i += 4;
        if i + data_len > extra.len() {
            return None;
        }
        if id == wanted {
            return Some(&extra[i..i + data_len]);
        }
        i += data_len;
    }
    None
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn read_u16_le<R: Read>(source: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    source.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(source: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read>(source: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    source.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
