use anyhow::{Context, Result};
use axum::Router;
use lanshare::{
    config::AppConfig,
    routes::routes::routes,
    services::{network::network_url, reclaimer::Reclaimer},
    state::AppState,
};
use std::{io::ErrorKind, path::Path};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::debug!("Starting lanshare with config: {:?}", cfg);

    let state = AppState::new(cfg.clone());

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        tracing::info!("Creating storage directory at {}", cfg.storage_dir);
    }
    state
        .storage
        .ensure_dir()
        .await
        .with_context(|| format!("preparing storage directory {}", cfg.storage_dir))?;

    // --- Drop uploads interrupted by the previous run ---
    match state.storage.purge_in_progress().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Removed unfinished uploads from a previous run"),
        Err(err) => tracing::warn!(error = %err, "Startup cleanup failed"),
    }

    let reclaimer = Reclaimer::new(state.storage.clone(), cfg.reclaim_policy()).start();

    // --- Build router ---
    let app: Router = routes(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    let local = listener.local_addr()?;
    print_banner(&cfg, local.port()).await;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reclaimer.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn print_banner(cfg: &AppConfig, port: u16) {
    tracing::info!("lanshare is running");
    tracing::info!("  Local:   http://localhost:{}", port);
    tracing::info!("  Network: {}", network_url(&cfg.host, port).await);
    tracing::info!("  Storage: {}", cfg.storage_dir);
    tracing::info!(
        max_file_size = ?cfg.max_file_size,
        upload_policy = ?cfg.upload_policy,
        abandoned_after_secs = cfg.abandoned_after.as_secs(),
        retention_secs = ?cfg.retention.map(|r| r.as_secs()),
        "Upload and cleanup policy"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
