//! Represents a file held in the storage directory.
//!
//! The directory is the only source of truth: a file's identity, state and
//! metadata are all derived from its name and its filesystem attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker suffix carried by files that are still being written.
pub const IN_PROGRESS_SUFFIX: &str = ".uploading";

/// Upper bound for the sanitized original-name part of a stored name, in bytes.
///
/// Leaves room for a 13+ digit millisecond prefix, the dash and the in-progress
/// suffix inside a 255-byte filesystem name limit.
pub const MAX_ORIGINAL_NAME_BYTES: usize = 200;

/// Lifecycle state of a stored file, derived from its on-disk name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    /// Partially written; invisible to listing, download and delete.
    InProgress,
    /// Fully written and promoted.
    Completed,
}

impl FileState {
    pub fn of(file_name: &str) -> Self {
        if file_name.ends_with(IN_PROGRESS_SUFFIX) {
            FileState::InProgress
        } else {
            FileState::Completed
        }
    }
}

/// A completed file as seen by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Timestamp-prefixed name on disk.
    pub stored_name: String,

    /// Client-supplied name, recovered from the stored name.
    pub original_name: String,

    /// Size reported by the filesystem.
    pub size_bytes: u64,

    /// Filesystem modification time.
    pub modified: DateTime<Utc>,
}

/// Build the completed name for an upload started at `millis`.
pub fn stored_name(millis: u128, sanitized_original: &str) -> String {
    format!("{}-{}", millis, sanitized_original)
}

/// In-progress name for a completed name.
pub fn in_progress_name(stored_name: &str) -> String {
    format!("{}{}", stored_name, IN_PROGRESS_SUFFIX)
}

/// Recover the original name by stripping a leading `<digits>-` prefix.
///
/// Names without such a prefix (files dropped into the directory by hand)
/// are returned as-is.
pub fn original_name_of(stored_name: &str) -> &str {
    let digits = stored_name
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits > 0 && stored_name.as_bytes().get(digits) == Some(&b'-') {
        &stored_name[digits + 1..]
    } else {
        stored_name
    }
}

/// Whether a name supplied in a request may address a completed file.
///
/// Rejects path separators, hidden entries (which covers `.` and `..`) and
/// in-progress files. A single path component cannot leave the directory,
/// so `..` inside a name such as `v1..2.pdf` is fine.
pub fn is_addressable(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
        && FileState::of(name) == FileState::Completed
}

/// Reduce a client-supplied file name to something safe to embed in a stored name.
pub fn sanitize_original_name(raw: &str) -> String {
    let last = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(raw)
        .trim();

    let mut name: String = last
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    if name.is_empty() || name == "." || name == ".." {
        name = "file".to_string();
    }

    if name.len() > MAX_ORIGINAL_NAME_BYTES {
        name = truncate_keeping_extension(&name, MAX_ORIGINAL_NAME_BYTES);
    }

    if name.ends_with(IN_PROGRESS_SUFFIX) {
        name.push('_');
    }

    name
}

fn truncate_keeping_extension(name: &str, max_bytes: usize) -> String {
    let (stem, ext) = match name.rfind('.') {
        // only treat short tails as extensions
        Some(pos) if pos > 0 && name.len() - pos <= 16 => name.split_at(pos),
        _ => (name, ""),
    };
    let budget = max_bytes.saturating_sub(ext.len());
    let mut cut = budget.min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_follows_suffix() {
        assert_eq!(FileState::of("1-a.txt"), FileState::Completed);
        assert_eq!(FileState::of("1-a.txt.uploading"), FileState::InProgress);
    }

    #[test]
    fn original_name_strips_timestamp_prefix() {
        assert_eq!(original_name_of("1700000000000-report.pdf"), "report.pdf");
        assert_eq!(original_name_of("1-2-3.txt"), "2-3.txt");
        assert_eq!(original_name_of("notes.txt"), "notes.txt");
        assert_eq!(original_name_of("-x"), "-x");
        assert_eq!(original_name_of("123"), "123");
    }

    #[test]
    fn names_compose() {
        let name = stored_name(42, "a.bin");
        assert_eq!(name, "42-a.bin");
        assert_eq!(in_progress_name(&name), "42-a.bin.uploading");
        assert_eq!(original_name_of(&name), "a.bin");
    }

    #[test]
    fn addressable_rejects_traversal_and_in_progress() {
        assert!(is_addressable("1-report.pdf"));
        assert!(!is_addressable(""));
        assert!(!is_addressable("../etc/passwd"));
        assert!(!is_addressable("a/b"));
        assert!(!is_addressable("a\\b"));
        assert!(!is_addressable(".hidden"));
        assert!(!is_addressable("1-report.pdf.uploading"));
        assert!(!is_addressable(".."));
    }

    #[test]
    fn sanitized_names_are_addressable() {
        for raw in ["v1..2.pdf", "..x", "a..", "dir/../b.txt", "trick.uploading"] {
            let stored = stored_name(1, &sanitize_original_name(raw));
            assert!(is_addressable(&stored), "{} -> {}", raw, stored);
        }
    }

    #[test]
    fn sanitize_keeps_last_component() {
        assert_eq!(sanitize_original_name("C:\\Users\\me\\doc.txt"), "doc.txt");
        assert_eq!(sanitize_original_name("../../secret"), "secret");
        assert_eq!(sanitize_original_name(".."), "file");
        assert_eq!(sanitize_original_name("   "), "file");
        assert_eq!(sanitize_original_name("a\nb.txt"), "a_b.txt");
        assert_eq!(sanitize_original_name("résumé.pdf"), "résumé.pdf");
    }

    #[test]
    fn sanitize_never_produces_in_progress_name() {
        let name = sanitize_original_name("trick.uploading");
        assert_eq!(name, "trick.uploading_");
        assert_eq!(FileState::of(&name), FileState::Completed);
    }

    #[test]
    fn sanitize_truncates_long_names_on_char_boundary() {
        let long = format!("{}.tar.gz", "é".repeat(300));
        let name = sanitize_original_name(&long);
        assert!(name.len() <= MAX_ORIGINAL_NAME_BYTES);
        assert!(name.ends_with(".gz"));
        assert!(name.starts_with('é'));
    }
}
