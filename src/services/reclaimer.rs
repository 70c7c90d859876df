//! Periodic cleanup of the storage directory.
//!
//! Each sweep deletes in-progress uploads older than the abandonment
//! threshold and, when retention is enabled, completed files older than the
//! retention threshold. A failed delete is logged and the sweep moves on.

use std::time::{Duration, SystemTime};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    models::stored_file::FileState,
    services::storage_service::{StorageResult, StorageService},
};

#[derive(Debug, Clone, Copy)]
pub struct ReclaimPolicy {
    /// Time between sweeps.
    pub interval: Duration,
    /// Age past which an in-progress upload counts as abandoned.
    pub abandoned_after: Duration,
    /// Age past which a completed file is deleted; `None` keeps files forever.
    pub retention: Option<Duration>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub abandoned_removed: usize,
    pub expired_removed: usize,
    pub failures: usize,
}

#[derive(Clone)]
pub struct Reclaimer {
    storage: StorageService,
    policy: ReclaimPolicy,
}

impl Reclaimer {
    pub fn new(storage: StorageService, policy: ReclaimPolicy) -> Self {
        Self { storage, policy }
    }

    /// Start the background sweep loop.
    /// Returns a JoinHandle so the caller can abort it on shutdown.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.sweep().await {
                    Ok(report) if report.abandoned_removed + report.expired_removed > 0 => {
                        tracing::info!(
                            scanned = report.scanned,
                            abandoned_removed = report.abandoned_removed,
                            expired_removed = report.expired_removed,
                            failures = report.failures,
                            "Reclaimer sweep completed"
                        );
                    }
                    Ok(report) => {
                        tracing::debug!(scanned = report.scanned, "Reclaimer sweep found nothing to remove");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reclaimer sweep failed");
                    }
                }
            }
        })
    }

    pub async fn sweep(&self) -> StorageResult<SweepReport> {
        self.sweep_at(SystemTime::now()).await
    }

    /// Run one sweep judging ages against `now`.
    pub async fn sweep_at(&self, now: SystemTime) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();

        for entry in self.storage.entries().await? {
            report.scanned += 1;

            // entries stamped in the future count as brand new
            let age = now.duration_since(entry.modified).unwrap_or(Duration::ZERO);
            let expired = match entry.state {
                FileState::InProgress => age > self.policy.abandoned_after,
                FileState::Completed => self.policy.retention.is_some_and(|limit| age > limit),
            };
            if !expired {
                continue;
            }

            match self.storage.discard(&entry.name).await {
                Ok(()) => {
                    tracing::info!(
                        name = %entry.name,
                        state = ?entry.state,
                        age_secs = age.as_secs(),
                        "Reclaimed expired entry"
                    );
                    match entry.state {
                        FileState::InProgress => report.abandoned_removed += 1,
                        FileState::Completed => report.expired_removed += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to reclaim entry, continuing sweep");
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn make_reclaimer(retention: Option<Duration>) -> (tempfile::TempDir, Reclaimer) {
        let temp = tempdir().expect("tempdir");
        let storage = StorageService::new(temp.path());
        let policy = ReclaimPolicy {
            interval: Duration::from_secs(60),
            abandoned_after: HOUR,
            retention,
        };
        (temp, Reclaimer::new(storage, policy))
    }

    fn touch(reclaimer: &Reclaimer, name: &str) {
        std::fs::write(reclaimer.storage.base_path.join(name), b"data").expect("write");
    }

    fn exists(reclaimer: &Reclaimer, name: &str) -> bool {
        reclaimer.storage.base_path.join(name).exists()
    }

    #[tokio::test]
    async fn abandoned_upload_is_removed_after_threshold() {
        let (_temp, reclaimer) = make_reclaimer(Some(24 * HOUR));
        touch(&reclaimer, "1-big.iso.uploading");
        touch(&reclaimer, "2-done.txt");

        let early = reclaimer
            .sweep_at(SystemTime::now() + HOUR / 2)
            .await
            .expect("sweep");
        assert_eq!(early.abandoned_removed, 0);
        assert!(exists(&reclaimer, "1-big.iso.uploading"));

        let later = reclaimer
            .sweep_at(SystemTime::now() + 2 * HOUR)
            .await
            .expect("sweep");
        assert_eq!(
            later,
            SweepReport {
                scanned: 2,
                abandoned_removed: 1,
                expired_removed: 0,
                failures: 0,
            }
        );
        assert!(!exists(&reclaimer, "1-big.iso.uploading"));
        assert!(exists(&reclaimer, "2-done.txt"));
    }

    #[tokio::test]
    async fn completed_file_expires_after_retention() {
        let (_temp, reclaimer) = make_reclaimer(Some(24 * HOUR));
        touch(&reclaimer, "1-old.txt");

        let report = reclaimer
            .sweep_at(SystemTime::now() + 25 * HOUR)
            .await
            .expect("sweep");
        assert_eq!(report.expired_removed, 1);
        assert!(!exists(&reclaimer, "1-old.txt"));
    }

    #[tokio::test]
    async fn disabled_retention_keeps_completed_files() {
        let (_temp, reclaimer) = make_reclaimer(None);
        touch(&reclaimer, "1-keep.txt");

        let report = reclaimer
            .sweep_at(SystemTime::now() + 1000 * HOUR)
            .await
            .expect("sweep");
        assert_eq!(report.expired_removed, 0);
        assert!(exists(&reclaimer, "1-keep.txt"));
    }

    #[tokio::test]
    async fn hidden_entries_and_directories_are_ignored() {
        let (_temp, reclaimer) = make_reclaimer(Some(24 * HOUR));
        touch(&reclaimer, ".readyz-probe");
        std::fs::create_dir(reclaimer.storage.base_path.join("9-dir.uploading")).expect("mkdir");

        let report = reclaimer
            .sweep_at(SystemTime::now() + 1000 * HOUR)
            .await
            .expect("sweep");
        assert_eq!(report, SweepReport::default());
        assert!(exists(&reclaimer, ".readyz-probe"));
        assert!(exists(&reclaimer, "9-dir.uploading"));
    }

    #[tokio::test]
    async fn sweep_reports_missing_directory() {
        let temp = tempdir().expect("tempdir");
        let storage = StorageService::new(temp.path().join("gone"));
        let reclaimer = Reclaimer::new(
            storage,
            ReclaimPolicy {
                interval: Duration::from_secs(60),
                abandoned_after: HOUR,
                retention: None,
            },
        );
        assert!(reclaimer.sweep().await.is_err());
    }
}
