//! HTTP handlers for uploading, listing, downloading and deleting files.
//! Bodies are streamed in both directions; storage concerns live in
//! `StorageService`.

use crate::{
    errors::AppError,
    models::api::{FileListing, MessageResponse, UploadResponse},
    services::{download::on_completion, upload_batch::UploadBatch},
    state::AppState,
    text::content_disposition,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{StreamExt, TryStreamExt};
use std::io::{self, SeekFrom};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Multipart field carrying uploaded files.
pub const UPLOAD_FIELD: &str = "files";

/// POST `/upload`: stream every `files` part to disk.
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut batch = UploadBatch::new(
        &state.storage,
        state.config.upload_policy,
        state.config.upload_limits(),
    );

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                batch.abort().await;
                return Err(err.into());
            }
        };

        if field.name() != Some(UPLOAD_FIELD) {
            tracing::debug!(field = ?field.name(), "ignoring unexpected multipart field");
            continue;
        }
        let Some(raw_name) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
        else {
            tracing::debug!("ignoring file part without a file name");
            continue;
        };

        let stream = field.map(|chunk| chunk.map_err(io::Error::other));
        batch.receive(&raw_name, stream).await?;
    }

    let files = batch.finish()?;
    Ok(Json(UploadResponse {
        success: true,
        message: format!("{} file(s) uploaded successfully", files.len()),
        files,
    }))
}

/// GET `/files`: completed files, newest first.
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileListing>>, AppError> {
    let files = state.storage.list().await?;
    Ok(Json(files.iter().map(FileListing::from).collect()))
}

/// GET `/download/{filename}`: stream the file, then delete it once fully sent.
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request_headers: HeaderMap,
) -> Result<Response, AppError> {
    let (meta, mut file) = state.storage.open(&filename).await?;
    let file_size = meta.size_bytes;

    let range = match parse_range(request_headers.get(header::RANGE), file_size) {
        Ok(range) => range,
        Err(RangeNotSatisfiable) => return Ok(range_not_satisfiable(file_size)),
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&meta.original_name)) {
        response_headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let (status, body) = match range {
        Some((start, end)) => {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|err| AppError::internal(err.to_string()))?;
            let length = end - start + 1;
            tracing::debug!(stored_name = %meta.stored_name, start, end, length, "range download");
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            if let Ok(value) =
                HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, file_size))
            {
                response_headers.insert(header::CONTENT_RANGE, value);
            }
            // A range ending at EOF counts as a finished download even when
            // earlier bytes were never requested.
            let body = self_destructing_body(
                &state,
                meta.stored_name.clone(),
                file.take(length),
                length,
                end + 1 == file_size,
            );
            (StatusCode::PARTIAL_CONTENT, body)
        }
        None => {
            tracing::info!(stored_name = %meta.stored_name, size_bytes = file_size, "download started");
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
            let body =
                self_destructing_body(&state, meta.stored_name.clone(), file, file_size, true);
            (StatusCode::OK, body)
        }
    };

    Ok((status, response_headers, body).into_response())
}

/// DELETE `/delete/{filename}`: remove a completed file right away.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.storage.remove(&filename).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "File deleted successfully".into(),
    }))
}

/// Stream `reader` and, once all `length` bytes are sent and `reaches_end`
/// holds, schedule the file's deletion after the configured grace delay.
fn self_destructing_body<R>(
    state: &AppState,
    stored_name: String,
    reader: R,
    length: u64,
    reaches_end: bool,
) -> Body
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let storage = state.storage.clone();
    let grace = state.config.delete_grace;
    let log_name = stored_name.clone();

    let stream = ReaderStream::new(reader).inspect_err(move |err| {
        tracing::warn!(
            stored_name = %log_name,
            error = %err,
            "download aborted by read error, keeping file"
        );
    });
    let stream = on_completion(stream, length, move || {
        if reaches_end {
            storage.schedule_removal(stored_name, grace);
        }
    });

    Body::from_stream(stream)
}

#[derive(Debug, PartialEq, Eq)]
struct RangeNotSatisfiable;

/// Parse a single `bytes=` range into inclusive offsets.
///
/// Syntactically invalid or multi-range headers are ignored (full response).
fn parse_range(
    value: Option<&HeaderValue>,
    file_size: u64,
) -> Result<Option<(u64, u64)>, RangeNotSatisfiable> {
    let Some(spec) = value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("bytes="))
    else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((start_part, end_part)) = spec.split_once('-') else {
        return Ok(None);
    };
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    let (start, end) = if start_part.is_empty() {
        let Ok(suffix) = end_part.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || file_size == 0 {
            return Err(RangeNotSatisfiable);
        }
        (file_size.saturating_sub(suffix), file_size - 1)
    } else {
        let Ok(start) = start_part.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end_part.is_empty() {
            file_size.saturating_sub(1)
        } else {
            match end_part.parse::<u64>() {
                Ok(end) => end.min(file_size.saturating_sub(1)),
                Err(_) => return Ok(None),
            }
        };
        (start, end)
    };

    if file_size == 0 || start >= file_size || start > end {
        return Err(RangeNotSatisfiable);
    }
    Ok(Some((start, end)))
}

fn range_not_satisfiable(file_size: u64) -> Response {
    let mut response = AppError::new(
        StatusCode::RANGE_NOT_SATISFIABLE,
        "Requested range not satisfiable",
    )
    .into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", file_size)) {
        response.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(value: &'static str, size: u64) -> Result<Option<(u64, u64)>, RangeNotSatisfiable> {
        parse_range(Some(&HeaderValue::from_static(value)), size)
    }

    #[test]
    fn no_header_means_full_body() {
        assert_eq!(parse_range(None, 10), Ok(None));
    }

    #[test]
    fn parses_bounded_open_and_suffix_ranges() {
        assert_eq!(range("bytes=0-4", 10), Ok(Some((0, 4))));
        assert_eq!(range("bytes=5-", 10), Ok(Some((5, 9))));
        assert_eq!(range("bytes=-3", 10), Ok(Some((7, 9))));
        assert_eq!(range("bytes=-30", 10), Ok(Some((0, 9))));
        assert_eq!(range("bytes=8-100", 10), Ok(Some((8, 9))));
    }

    #[test]
    fn malformed_ranges_are_ignored() {
        assert_eq!(range("items=0-4", 10), Ok(None));
        assert_eq!(range("bytes=a-b", 10), Ok(None));
        assert_eq!(range("bytes=0-1,4-5", 10), Ok(None));
    }

    #[test]
    fn out_of_bounds_ranges_are_rejected() {
        assert_eq!(range("bytes=10-", 10), Err(RangeNotSatisfiable));
        assert_eq!(range("bytes=5-2", 10), Err(RangeNotSatisfiable));
        assert_eq!(range("bytes=-0", 10), Err(RangeNotSatisfiable));
        assert_eq!(range("bytes=0-", 0), Err(RangeNotSatisfiable));
    }
}
