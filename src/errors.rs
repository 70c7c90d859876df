use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::storage_service::StorageError;

/// A lightweight wrapper for request failures that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::NoFilesProvided => {
                AppError::new(StatusCode::BAD_REQUEST, "No files were uploaded")
            }
            StorageError::PayloadTooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
            }
            StorageError::NotFound(_) => AppError::not_found("File not found"),
            StorageError::InvalidName(_) => AppError::new(StatusCode::BAD_REQUEST, err.to_string()),
            StorageError::InsufficientStorage(_) => {
                tracing::error!(error = %err, "storage is full");
                AppError::new(StatusCode::INSUFFICIENT_STORAGE, "Not enough disk space")
            }
            StorageError::RenameFailure { .. }
            | StorageError::ReadStreamFailure { .. }
            | StorageError::DeleteFailure { .. }
            | StorageError::DirectoryAccessFailure(_)
            | StorageError::Transport(_)
            | StorageError::Io(_) => {
                tracing::error!(error = %err, "request failed");
                AppError::internal(err.to_string())
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn storage_errors_map_to_statuses() {
        let cases = [
            (StorageError::NoFilesProvided, StatusCode::BAD_REQUEST),
            (
                StorageError::PayloadTooLarge { limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (StorageError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (StorageError::InvalidName("../x".into()), StatusCode::BAD_REQUEST),
            (
                StorageError::InsufficientStorage(io::Error::other("full")),
                StatusCode::INSUFFICIENT_STORAGE,
            ),
            (
                StorageError::RenameFailure {
                    name: "x".into(),
                    source: io::Error::other("busy"),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }
}
