//! Upload queue that survives restarts through [`QueueStore`].

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};

use super::form::{FileId, LocalFile};
use super::queue_store::{QueueItem, QueueStatus, QueueStore};
use super::uploader::{
    MediaUploader, ProgressMap, ProgressState, UploadError, UploadRequest, UploadResult,
};

/// A queue entry that reached blob storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedUpload {
    pub id: FileId,
    pub file_name: String,
    pub result: UploadResult,
}

pub struct UploadQueue {
    store: QueueStore,
    uploader: Arc<dyn MediaUploader>,
    progress: ProgressMap,
    items: Mutex<Vec<QueueItem>>,
    max_age: Duration,
}

impl UploadQueue {
    pub fn new(store: QueueStore, uploader: Arc<dyn MediaUploader>, max_age: Duration) -> Self {
        Self {
            store,
            uploader,
            progress: ProgressMap::new(),
            items: Mutex::new(Vec::new()),
            max_age,
        }
    }

    fn items_mut(&self) -> MutexGuard<'_, Vec<QueueItem>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reload items left over from a previous session, after dropping stale
    /// ones. Store failures degrade to an empty queue.
    pub async fn restore(&self) -> usize {
        if let Err(e) = self.store.init().await {
            log::warn!("Upload queue store unavailable: {}", e);
            return 0;
        }
        if let Err(e) = self.store.clear_old_items(self.max_age).await {
            log::warn!("Failed to drop stale queue items: {}", e);
        }
        let restored = match self.store.get_stored_items().await {
            Ok(items) => items,
            Err(e) => {
                log::warn!("Failed to read stored queue items: {}", e);
                Vec::new()
            }
        };
        let count = restored.len();
        let mut items = self.items_mut();
        for item in restored {
            if !items.iter().any(|i| i.id == item.id) {
                items.push(item);
            }
        }
        count
    }

    pub async fn enqueue(&self, file: LocalFile) -> FileId {
        let item = QueueItem::new(file);
        let id = item.file.id.clone();
        if let Err(e) = self.store.store_item(&item).await {
            log::warn!("Queue item {} kept in memory only: {}", item.id, e);
        }
        self.items_mut().push(item);
        id
    }

    /// Stop an item and drop it from the store. The canceled entry stays in
    /// memory so [`retry`](Self::retry) can put it back.
    pub async fn cancel(&self, id: &FileId) -> bool {
        let canceled = {
            let mut items = self.items_mut();
            let Some(item) = items.iter_mut().find(|i| i.id == id.as_str()) else {
                return false;
            };
            item.status = QueueStatus::Canceled;
            item.canceled_at = Some(Utc::now());
            item.id.clone()
        };
        self.progress.remove(id);
        if let Err(e) = self.store.remove_item(&canceled).await {
            log::warn!("Failed to drop canceled item {}: {}", canceled, e);
        }
        true
    }

    /// Put a failed or canceled item back in line.
    pub async fn retry(&self, id: &FileId) -> bool {
        let updated = {
            let mut items = self.items_mut();
            let Some(item) = items
                .iter_mut()
                .find(|i| i.id == id.as_str() && i.status != QueueStatus::Pending)
            else {
                return false;
            };
            item.status = QueueStatus::Pending;
            item.error = None;
            item.canceled_at = None;
            item.progress = 0;
            item.clone()
        };
        if let Err(e) = self.store.store_item(&updated).await {
            log::warn!("Failed to persist retry of {}: {}", updated.id, e);
        }
        true
    }

    /// Upload every pending item in order. Completed items leave the queue
    /// and the store; client-side rejections are marked failed and dropped
    /// from the store, transient failures stay stored for a later retry.
    pub async fn process(&self, request: &UploadRequest) -> Vec<CompletedUpload> {
        let pending: Vec<QueueItem> = self
            .items_mut()
            .iter_mut()
            .filter(|i| i.status == QueueStatus::Pending)
            .map(|i| {
                i.started_at = Some(Utc::now());
                i.clone()
            })
            .collect();

        let mut completed = Vec::new();
        for item in pending {
            if self.status_of(&item.id) != Some(QueueStatus::Pending) {
                continue;
            }
            match self
                .uploader
                .upload(&item.file, request, Some(&self.progress))
                .await
            {
                Ok(result) => {
                    self.items_mut().retain(|i| i.id != item.id);
                    if let Err(e) = self.store.remove_item(&item.id).await {
                        log::warn!("Failed to drop uploaded item {}: {}", item.id, e);
                    }
                    completed.push(CompletedUpload {
                        id: item.file.id.clone(),
                        file_name: item.file.name.clone(),
                        result,
                    });
                }
                Err(e) => self.mark_failed(&item.id, &e).await,
            }
        }
        completed
    }

    async fn mark_failed(&self, id: &str, error: &UploadError) {
        log::warn!("Upload of queue item {} failed: {}", id, error);
        let updated = {
            let mut items = self.items_mut();
            let Some(item) = items.iter_mut().find(|i| i.id == id) else {
                return;
            };
            item.status = QueueStatus::Error;
            item.error = Some(error.to_string());
            if let Some(ProgressState::Failed(p)) = self.progress.get(&item.file.id) {
                item.progress = p;
            }
            item.clone()
        };
        let persisted = if error.is_permanent() {
            self.store.remove_item(id).await
        } else {
            self.store.store_item(&updated).await
        };
        if let Err(e) = persisted {
            log::warn!("Failed to persist failure of {}: {}", id, e);
        }
    }

    fn status_of(&self, id: &str) -> Option<QueueStatus> {
        self.items_mut().iter().find(|i| i.id == id).map(|i| i.status)
    }

    pub fn items(&self) -> Vec<QueueItem> {
        self.items_mut().clone()
    }

    pub fn progress(&self) -> &ProgressMap {
        &self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Fails files whose name is a key of `failures`.
    struct FakeUploader {
        failures: HashMap<String, UploadError>,
    }

    #[async_trait]
    impl MediaUploader for FakeUploader {
        async fn upload(
            &self,
            file: &LocalFile,
            _request: &UploadRequest,
            progress: Option<&ProgressMap>,
        ) -> Result<UploadResult, UploadError> {
            if let Some(map) = progress {
                map.set_progress(&file.id, 40);
            }
            if let Some(err) = self.failures.get(&file.name) {
                if let Some(map) = progress {
                    map.fail(&file.id);
                }
                return Err(err.clone());
            }
            if let Some(map) = progress {
                map.complete(&file.id);
            }
            Ok(UploadResult {
                key: format!("captains/u/media/{}", file.name),
                url: format!("http://blob/{}", file.name),
                pending_id: None,
                captain_video_id: None,
            })
        }
    }

    fn rejected(status: u16) -> UploadError {
        UploadError::Rejected {
            status,
            code: "short_video_too_large".into(),
            message: "too large".into(),
            limit_bytes: Some(10),
            size_bytes: Some(20),
        }
    }

    fn file(name: &str) -> LocalFile {
        LocalFile::new(name, "video/mp4", 1, name.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn failures_are_classified_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store_root = dir.path().join("q");
        let uploader = Arc::new(FakeUploader {
            failures: HashMap::from([
                ("big.mp4".to_string(), rejected(413)),
                ("flaky.mp4".to_string(), UploadError::Transport("reset".into())),
            ]),
        });
        let queue = UploadQueue::new(QueueStore::new(&store_root), uploader.clone(), Duration::days(7));
        assert_eq!(queue.restore().await, 0);

        let ok = queue.enqueue(file("ok.mp4")).await;
        let big = queue.enqueue(file("big.mp4")).await;
        let flaky = queue.enqueue(file("flaky.mp4")).await;

        let done = queue.process(&UploadRequest::charter_media(Some("c1".into()))).await;
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, ok);
        assert_eq!(done[0].result.key, "captains/u/media/ok.mp4");

        let items = queue.items();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.status == QueueStatus::Error));
        assert_eq!(items[0].progress, 40);
        assert_eq!(queue.progress().get(&ok), Some(ProgressState::Done));

        // Only the transient failure survives a restart.
        let reopened = UploadQueue::new(QueueStore::new(&store_root), uploader, Duration::days(7));
        assert_eq!(reopened.restore().await, 1);
        let restored = reopened.items();
        assert_eq!(restored[0].id, flaky.as_str());
        assert_eq!(restored[0].status, QueueStatus::Error);
        assert!(!restored.iter().any(|i| i.id == big.as_str()));
    }

    #[tokio::test]
    async fn cancel_drops_the_stored_copy_and_retry_restores_it() {
        let dir = tempfile::tempdir().unwrap();
        let store_root = dir.path().join("q");
        let uploader = Arc::new(FakeUploader {
            failures: HashMap::new(),
        });
        let queue = UploadQueue::new(QueueStore::new(&store_root), uploader.clone(), Duration::days(7));
        queue.restore().await;
        let id = queue.enqueue(file("a.mp4")).await;
        let keep = queue.enqueue(file("b.mp4")).await;

        assert!(queue.cancel(&id).await);
        let stored = QueueStore::new(&store_root).get_stored_items().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, keep.as_str());

        let reopened = UploadQueue::new(QueueStore::new(&store_root), uploader, Duration::days(7));
        assert_eq!(reopened.restore().await, 1);
        assert!(!reopened.items().iter().any(|i| i.id == id.as_str()));

        assert!(queue.retry(&id).await);
        let stored = QueueStore::new(&store_root).get_stored_items().await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn canceled_items_are_skipped_until_retried() {
        let uploader = Arc::new(FakeUploader {
            failures: HashMap::new(),
        });
        let queue = UploadQueue::new(QueueStore::unavailable(), uploader, Duration::days(7));
        let id = queue.enqueue(file("a.mp4")).await;
        assert!(queue.cancel(&id).await);

        let request = UploadRequest::charter_media(Some("c1".into()));
        assert!(queue.process(&request).await.is_empty());
        assert_eq!(queue.items()[0].status, QueueStatus::Canceled);

        assert!(queue.retry(&id).await);
        assert_eq!(queue.process(&request).await.len(), 1);
        assert!(queue.items().is_empty());
    }
}
