//! Test helpers: build the router over a temporary storage directory.

#![allow(dead_code)]

use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use lanshare::config::{AppConfig, Args};
use lanshare::models::api::FileListing;
use lanshare::routes::routes::routes;
use lanshare::state::AppState;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Test application: server plus the directories it owns.
pub struct TestApp {
    pub server: TestServer,
    pub storage_dir: PathBuf,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Names currently on disk, in-progress ones included.
    pub fn names_on_disk(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.storage_dir)
            .expect("read storage dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(Args::default()).await
}

/// Build an app from `args`; storage, UI dir and a zero grace delay are filled in.
pub async fn setup_test_app_with(args: Args) -> TestApp {
    build_test_app(args, false).await
}

/// Same as [`setup_test_app`], served over a real socket so hyper's own
/// body handling (keep-alive, stop at `Content-Length`) is in play.
pub async fn setup_http_test_app() -> TestApp {
    build_test_app(Args::default(), true).await
}

async fn build_test_app(mut args: Args, http_transport: bool) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let storage_dir = temp_dir.path().join("uploads");
    let public_dir = temp_dir.path().join("public");
    std::fs::create_dir_all(&public_dir).expect("Failed to create public dir");
    std::fs::write(
        public_dir.join("index.html"),
        "<!doctype html><title>lanshare</title>",
    )
    .expect("Failed to write index.html");

    args.storage_dir = Some(storage_dir.to_string_lossy().into_owned());
    args.public_dir = Some(public_dir.to_string_lossy().into_owned());
    args.delete_grace_ms = args.delete_grace_ms.or(Some(0));

    let config = AppConfig::resolve(args, |_| None).expect("Failed to build config");
    let state = AppState::new(config);
    state
        .storage
        .ensure_dir()
        .await
        .expect("Failed to create storage dir");

    let server = if http_transport {
        TestServer::builder()
            .http_transport()
            .build(routes(state))
            .expect("Failed to create HTTP test server")
    } else {
        TestServer::new(routes(state)).expect("Failed to create test server")
    };

    TestApp {
        server,
        storage_dir,
        _temp_dir: temp_dir,
    }
}

pub fn file_part(name: &str, data: &'static str) -> Part {
    Part::bytes(bytes::Bytes::from_static(data.as_bytes()))
        .file_name(name)
        .mime_type("application/octet-stream")
}

pub fn form_with(files: Vec<(&str, &'static str)>) -> MultipartForm {
    files
        .into_iter()
        .fold(MultipartForm::new(), |form, (name, data)| {
            form.add_part("files", file_part(name, data))
        })
}

/// `/download/<name>` with the name percent-encoded for the URI.
pub fn download_path(stored_name: &str) -> String {
    format!(
        "/download/{}",
        utf8_percent_encode(stored_name, NON_ALPHANUMERIC)
    )
}

pub async fn list(client: &TestServer) -> Vec<FileListing> {
    let response = client.get("/files").await;
    assert_eq!(response.status_code(), 200);
    response.json::<Vec<FileListing>>()
}

/// Wait for a file to drop out of the listing after a download.
pub async fn wait_until_unlisted(client: &TestServer, stored_name: &str) -> bool {
    for _ in 0..100 {
        if !list(client).await.iter().any(|f| f.filename == stored_name) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
