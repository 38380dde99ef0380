#![allow(dead_code)]

use odt_image_replacer::{CompressionMethod, StreamingZipWriter};
use std::io::Cursor;

pub const MIMETYPE: &[u8] = b"application/vnd.oasis.opendocument.text";

pub const CONTENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:draw="urn:oasis:names:tc:opendocument:xmlns:drawing:1.0"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    xmlns:svg="urn:oasis:names:tc:opendocument:xmlns:svg-compatible:1.0"
    xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0">
    <office:body>
        <draw:frame draw:name="image1" draw:style-name="fr1">
            <draw:image xlink:href="Pictures/img1.png" />
            <svg:title>{img1}</svg:title>
        </draw:frame>
        <draw:frame draw:name="photo1" draw:style-name="fr2">
            <draw:image xlink:href="Pictures/photo1.jpg" />
        </draw:frame>
        <draw:frame draw:name="image1" draw:style-name="fr3">
            <draw:image xlink:href="Pictures/img1.png" />
        </draw:frame>
    </office:body>
</office:document-content>"#;

pub const MANIFEST_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0">
    <manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.text"/>
    <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
    <manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>
    <manifest:file-entry manifest:full-path="Pictures/img1.png" manifest:media-type="image/png"/>
    <manifest:file-entry manifest:full-path="Pictures/photo1.jpg" manifest:media-type="image/jpeg"/>
</manifest:manifest>
"#;

pub const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?><office:document-styles/>"#;

pub const IMG1_PNG: &[u8] = b"\x89PNG\r\n\x1a\noriginal image one";
pub const PHOTO1_JPG: &[u8] = b"\xff\xd8\xff\xe0original photo";

/// Entries of the standard test document, in archive order
pub fn standard_entries() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("mimetype", MIMETYPE.to_vec()),
        ("content.xml", CONTENT_XML.as_bytes().to_vec()),
        ("styles.xml", STYLES_XML.as_bytes().to_vec()),
        ("META-INF/manifest.xml", MANIFEST_XML.as_bytes().to_vec()),
        ("Pictures/img1.png", IMG1_PNG.to_vec()),
        ("Pictures/photo1.jpg", PHOTO1_JPG.to_vec()),
    ]
}

/// Build a ZIP from `(name, data)` pairs; `mimetype` is stored, the rest deflated
pub fn build_zip(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut writer = StreamingZipWriter::from_writer(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let method = if *name == "mimetype" {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflate
        };
        writer.write_entry(name, method, data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// The standard test document as bytes
pub fn standard_odt() -> Vec<u8> {
    build_zip(&standard_entries())
}

/// Standard document with `content.xml` swapped for `content`
pub fn odt_with_content(content: &str) -> Vec<u8> {
    let entries: Vec<_> = standard_entries()
        .into_iter()
        .map(|(name, data)| {
            if name == "content.xml" {
                (name, content.as_bytes().to_vec())
            } else {
                (name, data)
            }
        })
        .collect();
    build_zip(&entries)
}

/// Standard document without the named entry
pub fn odt_without(missing: &str) -> Vec<u8> {
    let entries: Vec<_> = standard_entries()
        .into_iter()
        .filter(|(name, _)| *name != missing)
        .collect();
    build_zip(&entries)
}

/// One hand-described entry for [`raw_zip`]; sizes and CRC are written as given
pub struct RawEntry<'a> {
    pub name: &'a [u8],
    pub method: u16,
    pub body: Vec<u8>,
    pub declared_size: u32,
    pub crc: u32,
    /// Directory offset of the local header, when it should not be the real one
    pub header_offset: Option<u32>,
}

impl<'a> RawEntry<'a> {
    /// Deflated entry whose header tells the truth
    pub fn deflated(name: &'a str, data: &[u8]) -> Self {
        Self {
            method: 8,
            body: deflate(data),
            ..Self::stored(name, data)
        }
    }

    /// Stored entry whose header tells the truth
    pub fn stored(name: &'a str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes(),
            method: 0,
            body: data.to_vec(),
            declared_size: data.len() as u32,
            crc: crc32fast::hash(data),
            header_offset: None,
        }
    }
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Local headers and bodies; returns the offset of each header
fn write_local_entries(out: &mut Vec<u8>, entries: &[RawEntry<'_>], zip64: bool) -> Vec<u64> {
    let mut offsets = Vec::new();
    for e in entries {
        offsets.push(out.len() as u64);
        let (csize, usize_) = if zip64 {
            (u32::MAX, u32::MAX)
        } else {
            (e.body.len() as u32, e.declared_size)
        };
        out.extend_from_slice(&0x04034b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&e.method.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // time/date
        out.extend_from_slice(&e.crc.to_le_bytes());
        out.extend_from_slice(&csize.to_le_bytes());
        out.extend_from_slice(&usize_.to_le_bytes());
        out.extend_from_slice(&(e.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        out.extend_from_slice(e.name);
        out.extend_from_slice(&e.body);
    }
    offsets
}

/// One central directory record. With `zip64` the sizes and offset are
/// placeholders and the real values sit in a ZIP64 extra field.
fn write_directory_record(out: &mut Vec<u8>, e: &RawEntry<'_>, offset: u64, zip64: bool) {
    let offset = e.header_offset.map_or(offset, u64::from);
    let mut extra = Vec::new();
    let (csize, usize_, offset_32) = if zip64 {
        extra.extend_from_slice(&0x0001u16.to_le_bytes());
        extra.extend_from_slice(&24u16.to_le_bytes());
        extra.extend_from_slice(&u64::from(e.declared_size).to_le_bytes());
        extra.extend_from_slice(&(e.body.len() as u64).to_le_bytes());
        extra.extend_from_slice(&offset.to_le_bytes());
        (u32::MAX, u32::MAX, u32::MAX)
    } else {
        (e.body.len() as u32, e.declared_size, offset as u32)
    };

    out.extend_from_slice(&0x02014b50u32.to_le_bytes());
    out.extend_from_slice(&20u16.to_le_bytes()); // version made by
    out.extend_from_slice(&20u16.to_le_bytes()); // version needed
    out.extend_from_slice(&0u16.to_le_bytes()); // flags
    out.extend_from_slice(&e.method.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // time/date
    out.extend_from_slice(&e.crc.to_le_bytes());
    out.extend_from_slice(&csize.to_le_bytes());
    out.extend_from_slice(&usize_.to_le_bytes());
    out.extend_from_slice(&(e.name.len() as u16).to_le_bytes());
    out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // comment len
    out.extend_from_slice(&0u16.to_le_bytes()); // disk start
    out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
    out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
    out.extend_from_slice(&offset_32.to_le_bytes());
    out.extend_from_slice(e.name);
    out.extend_from_slice(&extra);
}

fn write_classic_eocd(out: &mut Vec<u8>, count: u16, cd_size: u32, cd_start: u32) {
    out.extend_from_slice(&0x06054b50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // disk
    out.extend_from_slice(&0u16.to_le_bytes()); // disk with cd
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&cd_size.to_le_bytes());
    out.extend_from_slice(&cd_start.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // comment len
}

/// Assemble a classic (non-ZIP64) archive byte by byte, trusting every field
/// in `entries`; used to build archives that lie about themselves
pub fn raw_zip(entries: &[RawEntry<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    let offsets = write_local_entries(&mut out, entries, false);

    let cd_start = out.len() as u32;
    for (e, offset) in entries.iter().zip(offsets) {
        write_directory_record(&mut out, e, offset, false);
    }
    let cd_size = out.len() as u32 - cd_start;

    write_classic_eocd(&mut out, entries.len() as u16, cd_size, cd_start);
    out
}

/// Same entries as [`raw_zip`], but every size, offset and count lives only in
/// ZIP64 structures; the classic EOCD holds placeholders
pub fn raw_zip64(entries: &[RawEntry<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    let offsets = write_local_entries(&mut out, entries, true);

    let cd_start = out.len() as u64;
    for (e, offset) in entries.iter().zip(offsets) {
        write_directory_record(&mut out, e, offset, true);
    }
    let cd_size = out.len() as u64 - cd_start;

    let zip64_eocd = out.len() as u64;
    out.extend_from_slice(&0x06064b50u32.to_le_bytes());
    out.extend_from_slice(&44u64.to_le_bytes()); // size of remaining record
    out.extend_from_slice(&20u16.to_le_bytes()); // version made by
    out.extend_from_slice(&20u16.to_le_bytes()); // version needed
    out.extend_from_slice(&0u32.to_le_bytes()); // disk
    out.extend_from_slice(&0u32.to_le_bytes()); // disk with cd
    out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    out.extend_from_slice(&cd_size.to_le_bytes());
    out.extend_from_slice(&cd_start.to_le_bytes());

    out.extend_from_slice(&0x07064b50u32.to_le_bytes()); // locator
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&zip64_eocd.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // total disks

    write_classic_eocd(&mut out, u16::MAX, u32::MAX, u32::MAX);
    out
}
