//! Filename derivation and sanitization for downloaded resources.

use url::Url;

/// Fallback name when a URI has no usable path segment.
pub(crate) const FALLBACK_FILENAME: &str = "download.bin";

/// Derives the expected local filename from a resource URI.
///
/// A trailing `/download` segment is stripped, then the last path segment is
/// URL-decoded and sanitized:
/// `https://h/api/v2/files/SM_20240101.tif/download` → `SM_20240101.tif`.
pub(crate) fn filename_from_uri(uri: &str) -> String {
    let path = match Url::parse(uri) {
        Ok(url) => url.path().to_string(),
        Err(_) => uri.split(['?', '#']).next().unwrap_or(uri).to_string(),
    };
    let trimmed = path.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/download").unwrap_or(trimmed);

    let last = trimmed.rsplit('/').next().unwrap_or("");
    if last.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    let sanitized = sanitize_filename(&decoded);
    if sanitized.trim_matches('_').is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles both:
/// - `attachment; filename="example.tif"`
/// - `attachment; filename=example.tif`
/// - `attachment; filename*=UTF-8''example.tif` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();

        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters. `.` and `..` become `_`.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match sanitized.as_str() {
        "" => "_".to_string(),
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}
