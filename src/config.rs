use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

use crate::services::{reclaimer::ReclaimPolicy, storage_service::UploadLimits};

/// What happens to files already promoted in a request when a later part fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UploadPolicy {
    /// Keep files that were promoted before the failure.
    BestEffort,
    /// Remove every file promoted by the failing request.
    AllOrNothing,
}

impl FromStr for UploadPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(s, true)
            .map_err(|_| anyhow::anyhow!("expected `best-effort` or `all-or-nothing`, got `{}`", s))
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub public_dir: String,
    pub max_file_size: Option<u64>,
    pub upload_policy: UploadPolicy,
    pub upload_idle_timeout: Option<Duration>,
    pub delete_grace: Duration,
    pub sweep_interval: Duration,
    pub abandoned_after: Duration,
    pub retention: Option<Duration>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Share files across the local network")]
pub struct Args {
    /// Host to bind to (overrides LANSHARE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides LANSHARE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding shared files (overrides LANSHARE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Directory with the web UI (overrides LANSHARE_PUBLIC_DIR)
    #[arg(long)]
    pub public_dir: Option<String>,

    /// Per-file upload cap in bytes, 0 for none (overrides LANSHARE_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Multi-file failure handling (overrides LANSHARE_UPLOAD_POLICY)
    #[arg(long, value_enum)]
    pub upload_policy: Option<UploadPolicy>,

    /// Seconds without upload data before giving up, 0 for never
    /// (overrides LANSHARE_UPLOAD_IDLE_TIMEOUT)
    #[arg(long)]
    pub upload_idle_timeout: Option<u64>,

    /// Milliseconds between a finished download and deleting the file
    /// (overrides LANSHARE_DELETE_GRACE_MS)
    #[arg(long)]
    pub delete_grace_ms: Option<u64>,

    /// Seconds between reclaimer sweeps (overrides LANSHARE_SWEEP_INTERVAL)
    #[arg(long)]
    pub sweep_interval: Option<u64>,

    /// Age in seconds after which an unfinished upload is deleted
    /// (overrides LANSHARE_ABANDONED_AFTER)
    #[arg(long)]
    pub abandoned_after: Option<u64>,

    /// Age in seconds after which a completed file is deleted, 0 to keep
    /// forever (overrides LANSHARE_RETENTION)
    #[arg(long)]
    pub retention: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge parsed args over `lookup`-provided environment values over defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_host = lookup("LANSHARE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_storage = lookup("LANSHARE_STORAGE_DIR").unwrap_or_else(|| "./uploads".into());
        let env_public = lookup("LANSHARE_PUBLIC_DIR").unwrap_or_else(|| "./public".into());

        let port = pick(args.port, &lookup, "LANSHARE_PORT", 3000)?;
        let max_file_size = pick(args.max_file_size, &lookup, "LANSHARE_MAX_FILE_SIZE", 0)?;
        let upload_policy = pick(
            args.upload_policy,
            &lookup,
            "LANSHARE_UPLOAD_POLICY",
            UploadPolicy::BestEffort,
        )?;
        let idle_secs = pick(
            args.upload_idle_timeout,
            &lookup,
            "LANSHARE_UPLOAD_IDLE_TIMEOUT",
            0,
        )?;
        let grace_ms = pick(args.delete_grace_ms, &lookup, "LANSHARE_DELETE_GRACE_MS", 1000)?;
        let sweep_secs = pick(args.sweep_interval, &lookup, "LANSHARE_SWEEP_INTERVAL", 900)?;
        let abandoned_secs = pick(
            args.abandoned_after,
            &lookup,
            "LANSHARE_ABANDONED_AFTER",
            3600,
        )?;
        let retention_secs = pick(args.retention, &lookup, "LANSHARE_RETENTION", 86_400)?;

        if sweep_secs == 0 {
            bail!("sweep interval must be greater than zero");
        }
        if abandoned_secs == 0 {
            bail!("abandoned-upload threshold must be greater than zero");
        }
        if retention_secs != 0 && abandoned_secs >= retention_secs {
            bail!(
                "abandoned-upload threshold ({}s) must be shorter than retention ({}s)",
                abandoned_secs,
                retention_secs
            );
        }

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            public_dir: args.public_dir.unwrap_or(env_public),
            max_file_size: (max_file_size != 0).then_some(max_file_size),
            upload_policy,
            upload_idle_timeout: (idle_secs != 0).then(|| Duration::from_secs(idle_secs)),
            delete_grace: Duration::from_millis(grace_ms),
            sweep_interval: Duration::from_secs(sweep_secs),
            abandoned_after: Duration::from_secs(abandoned_secs),
            retention: (retention_secs != 0).then(|| Duration::from_secs(retention_secs)),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_file_size: self.max_file_size,
            idle_timeout: self.upload_idle_timeout,
        }
    }

    pub fn reclaim_policy(&self) -> ReclaimPolicy {
        ReclaimPolicy {
            interval: self.sweep_interval,
            abandoned_after: self.abandoned_after,
            retention: self.retention,
        }
    }
}

/// CLI value if given, else the parsed env value, else `default`.
fn pick<T>(cli: Option<T>, lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = cli {
        return Ok(value);
    }
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, raw)),
        None => Ok(default),
    }
}
