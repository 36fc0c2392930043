//! Dual-write registration of uploaded charter videos.
//!
//! A stored video gets a legacy `CharterMedia` row and a `CaptainVideo`
//! row. The writes are independent: either may fail without affecting the
//! other or the upload response. Failures become counters, not errors.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::correlator::{JobDispatcher, TranscodeJobRequest};
use super::telemetry::{Counter, MediaTelemetry};
use crate::db::models::{CaptainVideo, CharterMedia};
use crate::db::Repository;
use crate::domain::media::{CharterMediaKind, ProcessStatus};

/// A video that already reached blob storage.
#[derive(Debug, Clone)]
pub struct StoredVideo {
    pub user_id: Uuid,
    pub charter_id: String,
    pub key: String,
    pub url: String,
    pub filename: String,
    pub pending_id: Option<Uuid>,
}

/// What the registrar managed to do. Purely informational.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationOutcome {
    pub legacy_media_id: Option<Uuid>,
    pub captain_video_id: Option<Uuid>,
    pub queued: bool,
    pub legacy_job_sent: bool,
}

pub struct MediaRegistrar {
    repo: Arc<dyn Repository>,
    dispatcher: Arc<dyn JobDispatcher>,
    telemetry: Arc<MediaTelemetry>,
}

impl MediaRegistrar {
    pub fn new(
        repo: Arc<dyn Repository>,
        dispatcher: Arc<dyn JobDispatcher>,
        telemetry: Arc<MediaTelemetry>,
    ) -> Self {
        Self {
            repo,
            dispatcher,
            telemetry,
        }
    }

    pub async fn register_video(&self, video: &StoredVideo) -> RegistrationOutcome {
        let mut outcome = RegistrationOutcome::default();
        let ctx = format!("charter={} key={}", video.charter_id, video.key);

        // Legacy row first; its position comes from a read-then-write on sort_order.
        match self.repo.next_sort_order(&video.charter_id).await {
            Ok(sort_order) => {
                let row = CharterMedia {
                    id: Uuid::new_v4(),
                    charter_id: video.charter_id.clone(),
                    kind: CharterMediaKind::CharterVideo.as_str().to_string(),
                    url: video.url.clone(),
                    storage_key: video.key.clone(),
                    sort_order,
                    thumbnail_url: None,
                    duration_seconds: None,
                    created_at: Utc::now().naive_utc(),
                };
                match self.repo.insert_charter_media(row).await {
                    Ok(row) => {
                        outcome.legacy_media_id = Some(row.id);
                        self.telemetry.incr(Counter::LegacyMediaCreated, &ctx);
                    }
                    Err(e) => {
                        log::error!("Failed to create legacy charter media for {}: {}", video.key, e);
                        self.telemetry.incr(Counter::LegacyMediaFailed, &ctx);
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to compute sort order for charter {}: {}", video.charter_id, e);
                self.telemetry.incr(Counter::SortOrderFailed, &ctx);
                self.telemetry.incr(Counter::LegacyMediaFailed, &ctx);
            }
        }

        let now = Utc::now().naive_utc();
        let captain_video = CaptainVideo {
            id: Uuid::new_v4(),
            owner_id: video.user_id,
            original_url: video.url.clone(),
            blob_key: video.key.clone(),
            process_status: ProcessStatus::Queued.as_str().to_string(),
            ready_720p_url: None,
            thumbnail_url: None,
            processed_duration_sec: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        match self.repo.insert_captain_video(captain_video).await {
            Ok(created) => {
                outcome.captain_video_id = Some(created.id);
                self.telemetry
                    .incr(Counter::CaptainVideoCreated, &format!("{ctx} video={}", created.id));
            }
            Err(e) => {
                log::error!("Failed to create captain video for {}: {}", video.key, e);
                self.telemetry.incr(Counter::CaptainVideoFailed, &ctx);
                self.telemetry.incr(Counter::LegacyOnlyFallback, &ctx);
            }
        }

        if let Some(video_id) = outcome.captain_video_id {
            match self.dispatcher.enqueue_video(video_id).await {
                Ok(()) => {
                    outcome.queued = true;
                    self.telemetry
                        .incr(Counter::QueueDispatched, &format!("video={video_id}"));
                }
                Err(e) => {
                    log::warn!("Queue dispatch failed for video {}: {}", video_id, e);
                    self.telemetry
                        .incr(Counter::QueueDispatchFailed, &format!("video={video_id}"));
                }
            }
        }

        let job = TranscodeJobRequest {
            original_key: video.key.clone(),
            original_url: video.url.clone(),
            charter_id: video.charter_id.clone(),
            filename: video.filename.clone(),
            user_id: video.user_id,
            captain_video_id: outcome.captain_video_id,
            pending_id: video.pending_id,
        };
        match self.dispatcher.submit_transcode_job(&job).await {
            Ok(()) => {
                outcome.legacy_job_sent = true;
                self.telemetry.incr(
                    Counter::TranscodeJobDispatched,
                    &format!("{ctx} correlation={:?}", outcome.captain_video_id),
                );
            }
            Err(e) => {
                log::warn!("Legacy transcode job failed for {}: {}", video.key, e);
                self.telemetry.incr(Counter::TranscodeJobFailed, &ctx);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FaultPoint, MemoryRepository};
    use crate::services::correlator::DispatchError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakyDispatcher {
        fail_queue: bool,
        jobs: Mutex<Vec<TranscodeJobRequest>>,
    }

    #[async_trait]
    impl JobDispatcher for FlakyDispatcher {
        async fn enqueue_video(&self, _video_id: Uuid) -> Result<(), DispatchError> {
            if self.fail_queue {
                Err(DispatchError::Status {
                    status: 503,
                    body: "busy".into(),
                })
            } else {
                Ok(())
            }
        }

        async fn submit_transcode_job(&self, job: &TranscodeJobRequest) -> Result<(), DispatchError> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    fn stored() -> StoredVideo {
        StoredVideo {
            user_id: Uuid::new_v4(),
            charter_id: "c1".into(),
            key: "charters/c1/media/temp/1-a.mp4".into(),
            url: "http://x/media/charters/c1/media/temp/1-a.mp4".into(),
            filename: "a.mp4".into(),
            pending_id: None,
        }
    }

    #[tokio::test]
    async fn queue_failure_is_counted_and_legacy_job_still_sent() {
        let repo = Arc::new(MemoryRepository::new());
        let dispatcher = Arc::new(FlakyDispatcher {
            fail_queue: true,
            ..Default::default()
        });
        let telemetry = Arc::new(MediaTelemetry::new());
        let registrar = MediaRegistrar::new(repo.clone(), dispatcher.clone(), telemetry.clone());

        let outcome = registrar.register_video(&stored()).await;

        assert!(outcome.captain_video_id.is_some());
        assert!(!outcome.queued);
        assert!(outcome.legacy_job_sent);
        assert_eq!(telemetry.get(Counter::QueueDispatchFailed), 1);
        let jobs = dispatcher.jobs.lock().unwrap();
        assert_eq!(jobs[0].captain_video_id, outcome.captain_video_id);
    }

    #[tokio::test]
    async fn legacy_row_failure_does_not_block_new_pipeline() {
        let repo = Arc::new(MemoryRepository::new());
        repo.inject_fault(FaultPoint::InsertCharterMedia);
        let dispatcher = Arc::new(FlakyDispatcher::default());
        let telemetry = Arc::new(MediaTelemetry::new());
        let registrar = MediaRegistrar::new(repo.clone(), dispatcher, telemetry.clone());

        let outcome = registrar.register_video(&stored()).await;

        assert!(outcome.legacy_media_id.is_none());
        assert!(outcome.queued);
        assert_eq!(telemetry.get(Counter::LegacyMediaFailed), 1);
        assert_eq!(repo.captain_video_count(), 1);
    }

    #[tokio::test]
    async fn sort_order_appends_after_existing_media() {
        let repo = Arc::new(MemoryRepository::new());
        let dispatcher = Arc::new(FlakyDispatcher::default());
        let registrar =
            MediaRegistrar::new(repo.clone(), dispatcher, Arc::new(MediaTelemetry::new()));

        registrar.register_video(&stored()).await;
        registrar.register_video(&stored()).await;

        let orders: Vec<i32> = repo
            .charter_media_snapshot()
            .iter()
            .map(|m| m.sort_order)
            .collect();
        assert_eq!(orders, vec![0, 1]);
    }
}
