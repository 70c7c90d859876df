//! Defines routes for the file-sharing API.
//!
//! ## Structure
//! - **File endpoints**
//!   - `POST   /upload`               multipart upload, field `files`
//!   - `GET    /files`                list completed files
//!   - `GET    /download/{filename}`  stream, then self-delete
//!   - `DELETE /delete/{filename}`    delete now
//!
//! - **Service endpoints**
//!   - `GET /api/network-info`, `GET /healthz`, `GET /readyz`
//!
//! Anything else falls through to the static UI directory, so `GET /` serves
//! `index.html`.

use crate::{
    handlers::{
        file_handlers::{delete_file, download_file, list_files, upload_files},
        health_handlers::{healthz, network_info, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Build the router with shared state attached.
///
/// Upload size is policed by the storage layer, so axum's default body
/// limit is lifted on `/upload`.
pub fn routes(state: AppState) -> Router {
    let public_dir = state.config.public_dir.clone();

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/network-info", get(network_info))
        .route(
            "/upload",
            post(upload_files).layer(DefaultBodyLimit::disable()),
        )
        .route("/files", get(list_files))
        .route("/download/{filename}", get(download_file))
        .route("/delete/{filename}", delete(delete_file))
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
