//! Health, readiness and network-info handlers.
//!
//! - GET /healthz          -> simple liveness ("ok")
//! - GET /readyz           -> readiness that checks disk I/O in the storage directory
//! - GET /api/network-info -> URL other LAN devices can open

use crate::{models::api::NetworkInfo, services::network::network_url, state::AppState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Very small liveness probe: always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Performs a best-effort write/read/delete of a hidden probe file in the
/// storage directory. Hidden files are never listed nor reclaimed.
///
/// HTTP 200 when the check passes, HTTP 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let tmp_path = state
        .storage
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let disk_check = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) => {
                if bytes == b"readyz" {
                    match fs::remove_file(&tmp_path).await {
                        Ok(_) => (true, None::<String>),
                        Err(e) => (true, Some(format!("could not remove tmp file: {}", e))),
                    }
                } else {
                    let _ = fs::remove_file(&tmp_path).await;
                    (false, Some("file content mismatch".to_string()))
                }
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                (false, Some(format!("could not read tmp file: {}", e)))
            }
        },
        Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
    };

    let disk_ok = disk_check.0;
    let mut checks = HashMap::new();
    checks.insert(
        "disk",
        CheckStatus {
            ok: disk_ok,
            error: disk_check.1,
        },
    );

    let body = ReadyResponse {
        status: if disk_ok { "ok".into() } else { "error".into() },
        checks,
    };
    let status = if disk_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// `GET /api/network-info`
pub async fn network_info(State(state): State<AppState>) -> Json<NetworkInfo> {
    Json(NetworkInfo {
        network_url: network_url(&state.config.host, state.config.port).await,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
