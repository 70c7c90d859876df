//! JSON bodies exchanged with the browser UI.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{models::stored_file::StoredFile, text::format_size};

/// One accepted part of an upload request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub original_name: String,
    /// Stored name on disk, used to address the file afterwards.
    pub filename: String,
    /// Human-readable size.
    pub size: String,
    pub size_bytes: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub files: Vec<UploadedFile>,
}

/// Catalog entry returned by `GET /files`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    pub filename: String,
    pub original_name: String,
    pub size: String,
    pub size_bytes: u64,
    /// RFC 3339 modification time.
    pub upload_date: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub network_url: String,
}

impl UploadedFile {
    /// Reports the sanitized name, the same one `GET /files` shows.
    pub fn new(file: &StoredFile) -> Self {
        Self {
            original_name: file.original_name.clone(),
            filename: file.stored_name.clone(),
            size: format_size(file.size_bytes),
            size_bytes: file.size_bytes,
        }
    }
}

impl From<&StoredFile> for FileListing {
    fn from(file: &StoredFile) -> Self {
        Self {
            filename: file.stored_name.clone(),
            original_name: file.original_name.clone(),
            size: format_size(file.size_bytes),
            size_bytes: file.size_bytes,
            upload_date: rfc3339(file.modified),
        }
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
