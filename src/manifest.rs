//! Keeps `META-INF/manifest.xml` in step with the resources placed in the
//! archive. Edits are textual, like the content part: one record is spliced
//! in before the closing `</manifest:manifest>`.

use crate::content::escape_attr;
use crate::error::{OdtError, Result};
use crate::media::mime_type_for;
use regex::Regex;

/// Manifest part
pub const MANIFEST_PATH: &str = "META-INF/manifest.xml";

#[derive(Debug, Clone)]
pub struct ManifestSync {
    closing: Regex,
}

impl ManifestSync {
    pub fn new() -> Result<Self> {
        Ok(Self {
            closing: Regex::new(r"(?i)</manifest:manifest\s*>")?,
        })
    }

    /// True when a `manifest:file-entry` for exactly `path` exists
    pub fn has_file_entry(&self, manifest: &str, path: &str) -> Result<bool> {
        let record = Regex::new(&format!(
            r#"<manifest:file-entry\b[^>]*\bmanifest:full-path="{}"[^>]*>"#,
            regex::escape(&escape_attr(path))
        ))?;
        Ok(record.is_match(manifest))
    }

    /// Manifest text with a record for `path` added, or `None` when the
    /// record is already there
    pub fn ensure_file_entry(&self, manifest: &str, path: &str) -> Result<Option<String>> {
        if self.has_file_entry(manifest, path)? {
            log::debug!("manifest already lists {}", path);
            return Ok(None);
        }

        let closing = self.closing.find_iter(manifest).last().ok_or_else(|| {
            OdtError::InvalidFormat(format!(
                "{} has no closing </manifest:manifest> element",
                MANIFEST_PATH
            ))
        })?;

        let record = format!(
            "    <manifest:file-entry manifest:full-path=\"{}\" manifest:media-type=\"{}\" />\n",
            escape_attr(path),
            mime_type_for(path)
        );

        let mut out = String::with_capacity(manifest.len() + record.len());
        out.push_str(&manifest[..closing.start()]);
        out.push_str(&record);
        out.push_str(&manifest[closing.start()..]);
        Ok(Some(out))
    }
}
