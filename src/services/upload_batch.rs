//! Multi-file upload bookkeeping.
//!
//! A batch receives the parts of one upload request in order and applies the
//! configured [`UploadPolicy`] when a part fails: with `BestEffort` files
//! promoted earlier stay on disk, with `AllOrNothing` they are removed.

use bytes::Bytes;
use futures::Stream;
use std::io;
use tracing::warn;

use crate::{
    config::UploadPolicy,
    models::api::UploadedFile,
    services::storage_service::{StorageError, StorageResult, StorageService, UploadLimits},
    text::repair_filename,
};

pub struct UploadBatch<'a> {
    storage: &'a StorageService,
    policy: UploadPolicy,
    limits: UploadLimits,
    accepted: Vec<UploadedFile>,
}

impl<'a> UploadBatch<'a> {
    pub fn new(storage: &'a StorageService, policy: UploadPolicy, limits: UploadLimits) -> Self {
        Self {
            storage,
            policy,
            limits,
            accepted: Vec::new(),
        }
    }

    /// Receive one part under its client-supplied (possibly mis-decoded) name.
    pub async fn receive<S>(&mut self, raw_name: &str, stream: S) -> StorageResult<()>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let original_name = repair_filename(raw_name);
        match self
            .storage
            .receive_stream(&original_name, stream, self.limits)
            .await
        {
            Ok(file) => {
                self.accepted.push(UploadedFile::new(&file));
                Ok(())
            }
            Err(err) => {
                self.abort().await;
                Err(err)
            }
        }
    }

    /// Undo the request's promotions if the policy asks for it.
    pub async fn abort(&mut self) {
        if self.policy != UploadPolicy::AllOrNothing {
            return;
        }
        for file in self.accepted.drain(..) {
            if let Err(err) = self.storage.discard(&file.filename).await {
                warn!(error = %err, "could not roll back promoted upload");
            }
        }
    }

    /// Accepted files, or `NoFilesProvided` when the request carried none.
    pub fn finish(self) -> StorageResult<Vec<UploadedFile>> {
        if self.accepted.is_empty() {
            return Err(StorageError::NoFilesProvided);
        }
        Ok(self.accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::tempdir;

    fn ok_stream(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    fn broken_stream() -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(vec![Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone"))])
    }

    fn completed(storage: &StorageService) -> usize {
        std::fs::read_dir(&storage.base_path)
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|e| !e.file_name().to_string_lossy().ends_with(".uploading"))
            .count()
    }

    #[tokio::test]
    async fn empty_batch_reports_no_files() {
        let temp = tempdir().expect("tempdir");
        let storage = StorageService::new(temp.path());
        let batch = UploadBatch::new(&storage, UploadPolicy::BestEffort, UploadLimits::default());
        assert!(matches!(batch.finish(), Err(StorageError::NoFilesProvided)));
    }

    #[tokio::test]
    async fn mis_decoded_names_are_repaired() {
        let temp = tempdir().expect("tempdir");
        let storage = StorageService::new(temp.path());
        let mut batch =
            UploadBatch::new(&storage, UploadPolicy::BestEffort, UploadLimits::default());

        batch
            .receive("rÃ©sumÃ©.pdf", ok_stream(b"cv"))
            .await
            .expect("receive");
        let files = batch.finish().expect("finish");
        assert_eq!(files[0].original_name, "résumé.pdf");
        assert!(files[0].filename.ends_with("-résumé.pdf"));
        assert_eq!(files[0].size_bytes, 2);
        assert_eq!(files[0].size, "2 Bytes");
    }

    #[tokio::test]
    async fn reported_name_matches_listing() {
        let temp = tempdir().expect("tempdir");
        let storage = StorageService::new(temp.path());
        let mut batch =
            UploadBatch::new(&storage, UploadPolicy::BestEffort, UploadLimits::default());

        batch
            .receive("photos/a\tb.jpg", ok_stream(b"img"))
            .await
            .expect("receive");
        let files = batch.finish().expect("finish");
        let listed = storage.list().await.expect("list");

        assert_eq!(files[0].original_name, "a_b.jpg");
        assert_eq!(listed[0].original_name, files[0].original_name);
    }

    #[tokio::test]
    async fn best_effort_keeps_earlier_files() {
        let temp = tempdir().expect("tempdir");
        let storage = StorageService::new(temp.path());
        let mut batch =
            UploadBatch::new(&storage, UploadPolicy::BestEffort, UploadLimits::default());

        batch.receive("a.txt", ok_stream(b"a")).await.expect("first");
        assert!(batch.receive("b.txt", broken_stream()).await.is_err());
        assert_eq!(completed(&storage), 1);
    }

    #[tokio::test]
    async fn all_or_nothing_rolls_back_earlier_files() {
        let temp = tempdir().expect("tempdir");
        let storage = StorageService::new(temp.path());
        let mut batch =
            UploadBatch::new(&storage, UploadPolicy::AllOrNothing, UploadLimits::default());

        batch.receive("a.txt", ok_stream(b"a")).await.expect("first");
        batch.receive("b.txt", ok_stream(b"b")).await.expect("second");
        assert!(batch.receive("c.txt", broken_stream()).await.is_err());
        assert_eq!(completed(&storage), 0);
        assert!(storage.list().await.expect("list").is_empty());
    }
}
