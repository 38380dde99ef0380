//! Media types for inserted images

/// Media type for entries whose extension is not in the table
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// MIME type for a resource path, from its extension (case-insensitive)
pub fn mime_type_for(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let ext = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_MEDIA_TYPE,
    };

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => DEFAULT_MEDIA_TYPE,
    }
}

/// File extension (with dot) for image bytes, from their magic number.
///
/// Needs at least 12 bytes; returns `None` for anything unrecognized.
pub fn sniff_image_extension(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 {
        return None;
    }

    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(".png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(".jpg")
    } else if data.starts_with(b"GIF") {
        Some(".gif")
    } else if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some(".webp")
    } else {
        None
    }
}
