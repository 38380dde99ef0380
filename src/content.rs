//! Tag lookup and image-reference substitution in `content.xml`.
//!
//! The content part is handled as text. A frame is the shortest span from a
//! `<draw:frame ...>` opening element to the next `</draw:frame>`, and its tag
//! is the `draw:name` attribute of that opening element. Self-closing frames,
//! nested frames and frames without an `xlink:href` are not matched.

use crate::error::{OdtError, Result};
use regex::{Captures, Regex};
use std::collections::HashSet;

/// Main content part
pub const CONTENT_PATH: &str = "content.xml";

/// Tag-independent patterns, compiled once per document
#[derive(Debug, Clone)]
pub struct FrameLocator {
    frame: Regex,
    name: Regex,
    href: Regex,
    /// Splits one frame region around the value of its first `xlink:href`
    href_span: Regex,
}

impl FrameLocator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            frame: Regex::new(r"<draw:frame\b([^>]*)>[\s\S]*?</draw:frame>")?,
            name: Regex::new(r#"\bdraw:name="([^"]+)""#)?,
            href: Regex::new(r#"\bxlink:href="([^"]*)""#)?,
            href_span: Regex::new(r#"\A([\s\S]*?\bxlink:href=")[^"]*("[\s\S]*)\z"#)?,
        })
    }

    /// Tags of all frames in appearance order, each reported once
    pub fn find_tags(&self, content: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.frame
            .captures_iter(content)
            .filter_map(|frame| self.frame_tag(&frame))
            .filter(|tag| seen.insert(tag.clone()))
            .collect()
    }

    /// Rewrite the `xlink:href` of the first frame tagged `tag`.
    ///
    /// Tags are compared decoded, the way [`FrameLocator::find_tags`] reports
    /// them. Only the attribute value changes; everything else in the frame
    /// and the document is kept byte for byte.
    pub fn replace_href(&self, content: &str, tag: &str, new_href: &str) -> Result<String> {
        if tag.is_empty() {
            return Err(OdtError::TagNotFound(String::new()));
        }

        let mut target = None;
        let mut extra_frames = 0usize;
        for frame in self.frame.captures_iter(content) {
            if self.frame_tag(&frame).as_deref() != Some(tag) {
                continue;
            }
            let Some(region) = frame.get(0) else { continue };
            let Some(caps) = self.href_span.captures(region.as_str()) else {
                continue;
            };
            if target.is_none() {
                target = Some((region.start(), region.end(), caps));
            } else {
                extra_frames += 1;
            }
        }

        let (start, end, caps) = target.ok_or_else(|| OdtError::TagNotFound(tag.to_string()))?;

        if extra_frames > 0 {
            log::warn!(
                "tag {:?} names {} more frame(s); only the first was replaced",
                tag,
                extra_frames
            );
        }

        let prefix = &caps[1];
        let suffix = &caps[2];
        let href = escape_attr(new_href);

        let mut out =
            String::with_capacity(content.len() + href.len() + prefix.len() + suffix.len());
        out.push_str(&content[..start]);
        out.push_str(prefix);
        out.push_str(&href);
        out.push_str(suffix);
        out.push_str(&content[end..]);
        Ok(out)
    }

    /// `xlink:href` of the first frame tagged `tag`, if any
    pub fn href_of(&self, content: &str, tag: &str) -> Option<String> {
        self.frame
            .captures_iter(content)
            .find(|frame| self.frame_tag(frame).as_deref() == Some(tag))
            .and_then(|frame| {
                let region = frame.get(0)?.as_str();
                self.href.captures(region).map(|c| unescape_attr(&c[1]))
            })
    }

    fn frame_tag(&self, frame: &Captures<'_>) -> Option<String> {
        let attrs = frame.get(1)?.as_str();
        self.name.captures(attrs).map(|c| unescape_attr(&c[1]))
    }
}

/// Escape a value for use inside a double-quoted XML attribute
pub(crate) fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Decode the predefined XML entities and numeric character references in an
/// attribute value. Unknown or malformed references are kept as written.
pub(crate) fn unescape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .and_then(|semi| decode_reference(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Character for the body of `&...;`
fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
