//! Pure text transforms: filename re-decoding, size formatting and the
//! download `Content-Disposition` value.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// RFC 5987 `attr-char` minus alphanumerics: everything else gets encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Undo a Latin-1 misreading of a UTF-8 file name.
///
/// Multipart clients may send UTF-8 filename bytes that an intermediary
/// decoded one byte per char. When every char fits in a byte and at least one
/// is non-ASCII, the chars are turned back into bytes and decoded as UTF-8.
/// Anything else, or a failed decode, returns the input unchanged.
pub fn repair_filename(raw: &str) -> String {
    if raw.is_ascii() || raw.chars().any(|c| u32::from(c) > 0xFF) {
        return raw.to_string();
    }

    let bytes: Vec<u8> = raw.chars().map(|c| u32::from(c) as u8).collect();
    match String::from_utf8(bytes) {
        Ok(decoded) => decoded,
        Err(_) => raw.to_string(),
    }
}

/// Human-readable size in binary units, e.g. `0 Bytes`, `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{:.2}", value);
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[unit])
}

/// `attachment` disposition carrying both an ASCII fallback and the exact
/// UTF-8 name (RFC 6266 / RFC 5987).
pub fn content_disposition(original_name: &str) -> String {
    let fallback: String = original_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(original_name, ATTR_CHAR)
    )
}
