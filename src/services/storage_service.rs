//! src/services/storage_service.rs
//!
//! StorageService: the upload/download lifecycle over a single flat
//! directory. There is no metadata store: every lookup is a fresh directory
//! scan and a file's state is encoded in its name (`<millis>-<name>` when
//! completed, `<millis>-<name>.uploading` while being written).

use crate::models::stored_file::{
    FileState, StoredFile, in_progress_name, is_addressable, original_name_of,
    sanitize_original_name, stored_name,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use std::{
    fs::Metadata,
    io::{self, ErrorKind},
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

/// How many successive millisecond slots are tried before giving up on a name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no files were provided")]
    NoFilesProvided,
    #[error("file exceeds the maximum upload size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("invalid file name `{0}`")]
    InvalidName(String),
    #[error("failed to promote `{name}`: {source}")]
    RenameFailure {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read `{name}`: {source}")]
    ReadStreamFailure {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to delete `{name}`: {source}")]
    DeleteFailure {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("storage directory unavailable: {0}")]
    DirectoryAccessFailure(#[source] io::Error),
    #[error("upload interrupted: {0}")]
    Transport(#[source] io::Error),
    #[error("not enough disk space: {0}")]
    InsufficientStorage(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Per-file limits applied while receiving an upload.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadLimits {
    /// Maximum accepted size in bytes; `None` means bounded only by disk space.
    pub max_file_size: Option<u64>,
    /// Maximum wait for the next chunk; `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

/// A regular, non-hidden directory entry in either state.
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub state: FileState,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

/// StorageService owns the storage directory:
/// - Receive an upload stream into an in-progress file and promote it
/// - List completed files, newest first
/// - Open a completed file for streaming out
/// - Remove a completed file, now or after a grace delay
///
/// It is cheap to clone and holds no state besides the directory path.
#[derive(Clone, Debug)]
pub struct StorageService {
    /// Directory holding every stored file.
    pub base_path: PathBuf,
}

impl StorageService {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Create the storage directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(StorageError::DirectoryAccessFailure)
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Validate a client-supplied stored name.
    ///
    /// In-progress names report `NotFound` since no completed file carries them.
    fn ensure_addressable(&self, name: &str) -> StorageResult<()> {
        if FileState::of(name) == FileState::InProgress {
            return Err(StorageError::NotFound(name.to_string()));
        }
        if !is_addressable(name) {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Stream one upload to disk and promote it.
    ///
    /// - Writes chunks as they arrive into `<stored>.uploading`.
    /// - Enforces `limits.max_file_size`, discarding the partial file on overflow.
    /// - A broken or stalled source stream leaves the partial file in place
    ///   for the reclaimer and reports `Transport`.
    /// - Syncs, then renames to the completed name.
    pub async fn receive_stream<S>(
        &self,
        original_name: &str,
        stream: S,
        limits: UploadLimits,
    ) -> StorageResult<StoredFile>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let sanitized = sanitize_original_name(original_name);
        let (stored, mut file) = self.allocate(&sanitized).await?;
        let tmp_path = self.path_of(&in_progress_name(&stored));
        debug!(stored_name = %stored, "receiving upload");

        let mut size_bytes: u64 = 0;
        pin_mut!(stream);
        loop {
            let next = match limits.idle_timeout {
                Some(idle) => match timeout(idle, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => Some(Err(io::Error::new(
                        ErrorKind::TimedOut,
                        "no data received within the upload idle timeout",
                    ))),
                },
                None => stream.next().await,
            };
            let Some(chunk_res) = next else { break };

            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(
                        stored_name = %stored,
                        received_bytes = size_bytes,
                        error = %err,
                        "upload stream broke, leaving partial file for reclaimer"
                    );
                    return Err(StorageError::Transport(err));
                }
            };

            size_bytes += chunk.len() as u64;
            if let Some(limit) = limits.max_file_size {
                if size_bytes > limit {
                    drop(file);
                    discard_partial(&tmp_path).await;
                    return Err(StorageError::PayloadTooLarge { limit });
                }
            }

            if let Err(err) = file.write_all(&chunk).await {
                drop(file);
                return Err(write_failure(&tmp_path, err).await);
            }
        }

        if let Err(err) = file.flush().await {
            drop(file);
            return Err(write_failure(&tmp_path, err).await);
        }
        if let Err(err) = file.sync_all().await {
            drop(file);
            return Err(write_failure(&tmp_path, err).await);
        }
        drop(file);

        let final_path = self.path_of(&stored);
        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|source| StorageError::RenameFailure {
                name: stored.clone(),
                source,
            })?;

        let meta = fs::metadata(&final_path).await?;
        info!(stored_name = %stored, size_bytes = meta.len(), "upload completed");
        Ok(stored_file(stored, &meta))
    }

    /// Create a fresh in-progress file, unique among both states.
    async fn allocate(&self, sanitized: &str) -> StorageResult<(String, File)> {
        self.allocate_at(now_millis(), sanitized).await
    }

    /// Exclusive-create `<millis>-<name>.uploading`, bumping `millis` while
    /// either that name or its completed form is taken.
    async fn allocate_at(&self, mut millis: u128, sanitized: &str) -> StorageResult<(String, File)> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let stored = stored_name(millis, sanitized);
            let tmp_path = self.path_of(&in_progress_name(&stored));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)
                .await
            {
                Ok(file) => {
                    if fs::try_exists(self.path_of(&stored)).await? {
                        drop(file);
                        discard_partial(&tmp_path).await;
                    } else {
                        return Ok((stored, file));
                    }
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(StorageError::DirectoryAccessFailure(err));
                }
                Err(err) if err.kind() == ErrorKind::StorageFull => {
                    return Err(StorageError::InsufficientStorage(err));
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
            millis += 1;
        }

        Err(StorageError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free stored name for `{}`", sanitized),
        )))
    }

    /// Every regular, non-hidden entry of the storage directory.
    ///
    /// Entries vanishing mid-scan are skipped.
    pub async fn entries(&self) -> StorageResult<Vec<DirEntryInfo>> {
        let mut dir = fs::read_dir(&self.base_path)
            .await
            .map_err(StorageError::DirectoryAccessFailure)?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(StorageError::DirectoryAccessFailure)?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(name = %name, "entry vanished during scan");
                    continue;
                }
                Err(err) => {
                    warn!(name = %name, error = %err, "could not stat entry, skipping");
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }

            entries.push(DirEntryInfo {
                state: FileState::of(&name),
                size_bytes: meta.len(),
                modified: meta.modified().unwrap_or(UNIX_EPOCH),
                name,
            });
        }

        Ok(entries)
    }

    /// Completed files, most recently modified first.
    ///
    /// Ties are broken by stored name so repeated listings are identical.
    pub async fn list(&self) -> StorageResult<Vec<StoredFile>> {
        let mut files: Vec<StoredFile> = self
            .entries()
            .await?
            .into_iter()
            .filter(|entry| entry.state == FileState::Completed)
            .map(|entry| StoredFile {
                original_name: original_name_of(&entry.name).to_string(),
                size_bytes: entry.size_bytes,
                modified: DateTime::<Utc>::from(entry.modified),
                stored_name: entry.name,
            })
            .collect();

        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.stored_name.cmp(&a.stored_name))
        });
        Ok(files)
    }

    /// Open a completed file for streaming out.
    pub async fn open(&self, name: &str) -> StorageResult<(StoredFile, File)> {
        self.ensure_addressable(name)?;

        let file = File::open(self.path_of(name)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::ReadStreamFailure {
                    name: name.to_string(),
                    source: err,
                }
            }
        })?;
        let meta = file
            .metadata()
            .await
            .map_err(|source| StorageError::ReadStreamFailure {
                name: name.to_string(),
                source,
            })?;
        if !meta.is_file() {
            return Err(StorageError::NotFound(name.to_string()));
        }

        Ok((stored_file(name.to_string(), &meta), file))
    }

    /// Delete a completed file immediately.
    pub async fn remove(&self, name: &str) -> StorageResult<()> {
        self.ensure_addressable(name)?;

        let path = self.path_of(name);
        match fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(StorageError::NotFound(name.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        fs::remove_file(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::DeleteFailure {
                    name: name.to_string(),
                    source: err,
                }
            }
        })?;

        info!(stored_name = %name, "file removed");
        Ok(())
    }

    /// Delete any entry by name, treating an already-missing file as success.
    ///
    /// Used by background cleanup, which also handles in-progress files.
    pub async fn discard(&self, name: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_of(name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::DeleteFailure {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Delete a file after `delay`, logging instead of failing.
    pub fn schedule_removal(&self, name: String, delay: Duration) -> JoinHandle<()> {
        let storage = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match storage.discard(&name).await {
                Ok(()) => info!(stored_name = %name, "downloaded file removed"),
                Err(err) => warn!(
                    stored_name = %name,
                    error = %err,
                    "could not remove downloaded file, leaving it for the reclaimer"
                ),
            }
        })
    }

    /// Remove every in-progress file regardless of age.
    ///
    /// Only safe before the server accepts requests.
    pub async fn purge_in_progress(&self) -> StorageResult<usize> {
        let mut removed = 0;
        for entry in self.entries().await? {
            if entry.state != FileState::InProgress {
                continue;
            }
            match self.discard(&entry.name).await {
                Ok(()) => {
                    debug!(name = %entry.name, "purged stale in-progress upload");
                    removed += 1;
                }
                Err(err) => warn!(error = %err, "failed to purge in-progress upload"),
            }
        }
        Ok(removed)
    }
}

fn stored_file(stored_name: String, meta: &Metadata) -> StoredFile {
    StoredFile {
        original_name: original_name_of(&stored_name).to_string(),
        size_bytes: meta.len(),
        modified: DateTime::<Utc>::from(meta.modified().unwrap_or(UNIX_EPOCH)),
        stored_name,
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Best-effort removal of a partial file the upload itself gave up on.
async fn discard_partial(path: &std::path::Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "could not remove partial upload");
        }
    }
}

/// Map a local write error, discarding the partial file.
async fn write_failure(path: &std::path::Path, err: io::Error) -> StorageError {
    discard_partial(path).await;
    if err.kind() == ErrorKind::StorageFull {
        StorageError::InsufficientStorage(err)
    } else {
        StorageError::Io(err)
    }
}
