//! Streaming ZIP writer that compresses entries on-the-fly
//!
//! Deflated entries are written with a data descriptor (sizes and CRC follow
//! the data). Stored entries are written whole, with sizes and CRC in the
//! local header and no descriptor, which is what the ODF `mimetype` entry
//! needs.

use crate::error::{OdtError, Result};
use crate::reader::{METHOD_DEFLATE, METHOD_STORED};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Seek, Write};

/// General purpose flag: sizes and CRC live in a trailing data descriptor
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// General purpose flag: names are UTF-8
const FLAG_UTF8: u16 = 0x0800;

const VERSION_NEEDED: u16 = 20;

const DEFLATE_LEVEL: u32 = 6;

/// Compression method to use for ZIP entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression (stored)
    Stored,
    /// DEFLATE compression
    Deflate,
}

/// Entry already written, kept for the central directory
struct WrittenEntry {
    name: String,
    flags: u16,
    local_header_offset: u64,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    compression_method: u16,
}

/// Streaming ZIP writer over any `Write + Seek` sink
pub struct StreamingZipWriter<W: Write + Seek> {
    output: W,
    entries: Vec<WrittenEntry>,
    current_entry: Option<CurrentEntry>,
}

struct CurrentEntry {
    name: String,
    local_header_offset: u64,
    encoder: DeflateEncoder<CompressedBuffer>,
    counter: CrcCounter,
}

/// Metadata tracker for CRC and byte counts
struct CrcCounter {
    crc: Crc32,
    uncompressed_count: u64,
    compressed_count: u64,
}

impl CrcCounter {
    fn new() -> Self {
        Self {
            crc: Crc32::new(),
            uncompressed_count: 0,
            compressed_count: 0,
        }
    }

    fn update_uncompressed(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.uncompressed_count += data.len() as u64;
    }

    fn add_compressed(&mut self, count: u64) {
        self.compressed_count += count;
    }

    fn finalize(&self) -> u32 {
        self.crc.clone().finalize()
    }
}

/// Buffered sink for compressed bytes, flushed to the output in chunks
///
/// Initial capacity and flush threshold follow the entry's size hint:
/// - Tiny (<10KB): 8KB initial, 256KB threshold
/// - Small (<100KB): 32KB initial, 512KB threshold
/// - Medium (<1MB): 128KB initial, 2MB threshold
/// - Large: 256KB initial, 4MB threshold
struct CompressedBuffer {
    buffer: Vec<u8>,
    flush_threshold: usize,
}

impl CompressedBuffer {
    fn with_size_hint(size_hint: Option<u64>) -> Self {
        let (initial_capacity, flush_threshold) = match size_hint {
            Some(size) if size < 10_000 => (8 * 1024, 256 * 1024),
            Some(size) if size < 100_000 => (32 * 1024, 512 * 1024),
            Some(size) if size < 1_000_000 => (128 * 1024, 2 * 1024 * 1024),
            _ => (256 * 1024, 4 * 1024 * 1024),
        };

        Self {
            buffer: Vec::with_capacity(initial_capacity),
            flush_threshold,
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.flush_threshold
    }
}

impl Write for CompressedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<W: Write + Seek> StreamingZipWriter<W> {
    /// Create a ZIP writer; entries are deflated at level 6
    pub fn from_writer(writer: W) -> Self {
        Self {
            output: writer,
            entries: Vec::new(),
            current_entry: None,
        }
    }

    /// Start a new deflated entry
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.start_entry_with_hint(name, None)
    }

    /// Start a new deflated entry with an uncompressed size hint for buffering
    pub fn start_entry_with_hint(&mut self, name: &str, size_hint: Option<u64>) -> Result<()> {
        self.finish_current_entry()?;

        let local_header_offset = self.output.stream_position()?;
        let flags = FLAG_DATA_DESCRIPTOR | utf8_flag(name);

        self.write_local_header(name, flags, METHOD_DEFLATE, 0, 0, 0)?;

        self.current_entry = Some(CurrentEntry {
            name: name.to_string(),
            local_header_offset,
            encoder: DeflateEncoder::new(
                CompressedBuffer::with_size_hint(size_hint),
                Compression::new(DEFLATE_LEVEL),
            ),
            counter: CrcCounter::new(),
        });

        Ok(())
    }

    /// Write uncompressed data to the current entry
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current_entry
            .as_mut()
            .ok_or_else(|| OdtError::InvalidFormat("no entry started".to_string()))?;

        entry.counter.update_uncompressed(data);
        entry.encoder.write_all(data)?;
        entry.encoder.flush()?;

        let buffer = entry.encoder.get_mut();
        if buffer.should_flush() {
            let compressed_data = buffer.take();
            self.output.write_all(&compressed_data)?;
            entry.counter.add_compressed(compressed_data.len() as u64);
        }

        Ok(())
    }

    /// Write a complete entry without compression or data descriptor
    pub fn write_stored_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.finish_current_entry()?;

        let size = data.len() as u64;
        if size > u32::MAX as u64 {
            return Err(OdtError::InvalidFormat(format!(
                "stored entry {} exceeds 4 GiB",
                name
            )));
        }

        let local_header_offset = self.output.stream_position()?;
        let flags = utf8_flag(name);
        let crc = crc32fast::hash(data);

        self.write_local_header(name, flags, METHOD_STORED, crc, size as u32, size as u32)?;
        self.output.write_all(data)?;

        self.entries.push(WrittenEntry {
            name: name.to_string(),
            flags,
            local_header_offset,
            crc32: crc,
            compressed_size: size,
            uncompressed_size: size,
            compression_method: METHOD_STORED,
        });

        Ok(())
    }

    /// Write a complete entry with the given method
    pub fn write_entry(&mut self, name: &str, method: CompressionMethod, data: &[u8]) -> Result<()> {
        match method {
            CompressionMethod::Stored => self.write_stored_entry(name, data),
            CompressionMethod::Deflate => {
                self.start_entry_with_hint(name, Some(data.len() as u64))?;
                self.write_data(data)
            }
        }
    }

    fn write_local_header(
        &mut self,
        name: &str,
        flags: u16,
        method: u16,
        crc: u32,
        compressed_size: u32,
        uncompressed_size: u32,
    ) -> Result<()> {
        let name_len = u16::try_from(name.len())
            .map_err(|_| OdtError::InvalidFormat(format!("entry name too long: {}", name)))?;

        self.output.write_all(&[0x50, 0x4b, 0x03, 0x04])?; // signature
        self.output.write_all(&VERSION_NEEDED.to_le_bytes())?;
        self.output.write_all(&flags.to_le_bytes())?;
        self.output.write_all(&method.to_le_bytes())?;
        self.output.write_all(&[0, 0, 0, 0])?; // mod time/date
        self.output.write_all(&crc.to_le_bytes())?;
        self.output.write_all(&compressed_size.to_le_bytes())?;
        self.output.write_all(&uncompressed_size.to_le_bytes())?;
        self.output.write_all(&name_len.to_le_bytes())?;
        self.output.write_all(&0u16.to_le_bytes())?; // extra len
        self.output.write_all(name.as_bytes())?;
        Ok(())
    }

    /// Finish current entry and write its data descriptor
    fn finish_current_entry(&mut self) -> Result<()> {
        if let Some(mut entry) = self.current_entry.take() {
            let mut buffer = entry.encoder.finish()?;

            let remaining_data = buffer.take();
            if !remaining_data.is_empty() {
                self.output.write_all(&remaining_data)?;
                entry.counter.add_compressed(remaining_data.len() as u64);
            }

            let crc = entry.counter.finalize();
            let compressed_size = entry.counter.compressed_count;
            let uncompressed_size = entry.counter.uncompressed_count;

            self.output.write_all(&[0x50, 0x4b, 0x07, 0x08])?;
            self.output.write_all(&crc.to_le_bytes())?;
            // ZIP64 data descriptor carries 64-bit sizes
            if compressed_size > u32::MAX as u64 || uncompressed_size > u32::MAX as u64 {
                self.output.write_all(&compressed_size.to_le_bytes())?;
                self.output.write_all(&uncompressed_size.to_le_bytes())?;
            } else {
                self.output
                    .write_all(&(compressed_size as u32).to_le_bytes())?;
                self.output
                    .write_all(&(uncompressed_size as u32).to_le_bytes())?;
            }

            let flags = FLAG_DATA_DESCRIPTOR | utf8_flag(&entry.name);
            self.entries.push(WrittenEntry {
                name: entry.name,
                flags,
                local_header_offset: entry.local_header_offset,
                crc32: crc,
                compressed_size,
                uncompressed_size,
                compression_method: METHOD_DEFLATE,
            });
        }
        Ok(())
    }

    /// Finish the ZIP (write central directory) and return the writer
    pub fn finish(mut self) -> Result<W> {
        self.finish_current_entry()?;

        let central_dir_offset = self.output.stream_position()?;

        for entry in &self.entries {
            self.output.write_all(&[0x50, 0x4b, 0x01, 0x02])?; // central dir sig
            self.output.write_all(&VERSION_NEEDED.to_le_bytes())?; // version made by
            self.output.write_all(&VERSION_NEEDED.to_le_bytes())?; // version needed
            self.output.write_all(&entry.flags.to_le_bytes())?;
            self.output
                .write_all(&entry.compression_method.to_le_bytes())?;
            self.output.write_all(&[0, 0, 0, 0])?; // mod time/date
            self.output.write_all(&entry.crc32.to_le_bytes())?;

            self.output
                .write_all(&placeholder_u32(entry.compressed_size).to_le_bytes())?;
            self.output
                .write_all(&placeholder_u32(entry.uncompressed_size).to_le_bytes())?;

            self.output
                .write_all(&(entry.name.len() as u16).to_le_bytes())?;

            let mut extra_field: Vec<u8> = Vec::new();
            if entry.uncompressed_size > u32::MAX as u64
                || entry.compressed_size > u32::MAX as u64
                || entry.local_header_offset > u32::MAX as u64
            {
                // ZIP64 extra field, only the values whose placeholder is set
                let mut data: Vec<u8> = Vec::new();
                if entry.uncompressed_size > u32::MAX as u64 {
                    data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
                }
                if entry.compressed_size > u32::MAX as u64 {
                    data.extend_from_slice(&entry.compressed_size.to_le_bytes());
                }
                if entry.local_header_offset > u32::MAX as u64 {
                    data.extend_from_slice(&entry.local_header_offset.to_le_bytes());
                }
                extra_field.extend_from_slice(&0x0001u16.to_le_bytes());
                extra_field.extend_from_slice(&(data.len() as u16).to_le_bytes());
                extra_field.extend_from_slice(&data);
            }

            self.output
                .write_all(&(extra_field.len() as u16).to_le_bytes())?; // extra len
            self.output.write_all(&0u16.to_le_bytes())?; // file comment len
            self.output.write_all(&0u16.to_le_bytes())?; // disk number start
            self.output.write_all(&0u16.to_le_bytes())?; // internal attrs
            self.output.write_all(&0u32.to_le_bytes())?; // external attrs
            self.output
                .write_all(&placeholder_u32(entry.local_header_offset).to_le_bytes())?;

            self.output.write_all(entry.name.as_bytes())?;
            if !extra_field.is_empty() {
                self.output.write_all(&extra_field)?;
            }
        }

        let central_dir_size = self.output.stream_position()? - central_dir_offset;

        let need_zip64 = self.entries.len() > u16::MAX as usize
            || central_dir_size > u32::MAX as u64
            || central_dir_offset > u32::MAX as u64;

        if need_zip64 {
            let zip64_eocd_pos = central_dir_offset + central_dir_size;

            // ZIP64 end of central directory record
            self.output.write_all(&[0x50, 0x4b, 0x06, 0x06])?;
            self.output.write_all(&44u64.to_le_bytes())?; // size of remaining fields
            self.output.write_all(&VERSION_NEEDED.to_le_bytes())?;
            self.output.write_all(&VERSION_NEEDED.to_le_bytes())?;
            self.output.write_all(&0u32.to_le_bytes())?; // disk number
            self.output.write_all(&0u32.to_le_bytes())?; // disk with central dir
            self.output
                .write_all(&(self.entries.len() as u64).to_le_bytes())?;
            self.output
                .write_all(&(self.entries.len() as u64).to_le_bytes())?;
            self.output.write_all(&central_dir_size.to_le_bytes())?;
            self.output.write_all(&central_dir_offset.to_le_bytes())?;

            // ZIP64 end of central directory locator
            self.output.write_all(&[0x50, 0x4b, 0x06, 0x07])?;
            self.output.write_all(&0u32.to_le_bytes())?;
            self.output.write_all(&zip64_eocd_pos.to_le_bytes())?;
            self.output.write_all(&1u32.to_le_bytes())?; // total number of disks
        }

        // Classic end of central directory
        self.output.write_all(&[0x50, 0x4b, 0x05, 0x06])?;
        self.output.write_all(&0u16.to_le_bytes())?; // disk number
        self.output.write_all(&0u16.to_le_bytes())?; // disk with central dir

        let count = if self.entries.len() > u16::MAX as usize {
            0xFFFF
        } else {
            self.entries.len() as u16
        };
        self.output.write_all(&count.to_le_bytes())?;
        self.output.write_all(&count.to_le_bytes())?;

        self.output
            .write_all(&placeholder_u32(central_dir_size).to_le_bytes())?;
        self.output
            .write_all(&placeholder_u32(central_dir_offset).to_le_bytes())?;

        self.output.write_all(&0u16.to_le_bytes())?; // comment len

        self.output.flush()?;
        Ok(self.output)
    }
}

/// 32-bit field value, or the ZIP64 placeholder when it does not fit
fn placeholder_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn utf8_flag(name: &str) -> u16 {
    if name.is_ascii() {
        0
    } else {
        FLAG_UTF8
    }
}
