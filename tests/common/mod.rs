#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use actix_web::{test, web};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use charter_media::config::AppConfig;
use charter_media::db::memory::MemoryRepository;
use charter_media::db::Repository;
use charter_media::services::correlator::{DispatchError, JobDispatcher, TranscodeJobRequest};
use charter_media::services::finalize::RateLimiter;
use charter_media::services::video_processor::TranscodeJob;
use charter_media::services::MediaTelemetry;
use charter_media::storage::LocalBlobStore;
use charter_media::AppState;

pub const BOUNDARY: &str = "----charter-media-test-boundary";

/// One dispatcher call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Queue(Uuid),
    /// The legacy job and whether its `captainVideoId` row existed when sent.
    Legacy {
        job: TranscodeJobRequest,
        captain_video_existed: bool,
    },
}

/// Records calls instead of making HTTP requests.
pub struct RecordingDispatcher {
    repo: Arc<MemoryRepository>,
    calls: Mutex<Vec<Dispatched>>,
}

impl RecordingDispatcher {
    pub fn calls(&self) -> Vec<Dispatched> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn enqueue_video(&self, video_id: Uuid) -> Result<(), DispatchError> {
        self.calls.lock().unwrap().push(Dispatched::Queue(video_id));
        Ok(())
    }

    async fn submit_transcode_job(&self, job: &TranscodeJobRequest) -> Result<(), DispatchError> {
        let captain_video_existed = match job.captain_video_id {
            Some(id) => self.repo.get_captain_video(id).await.unwrap().is_some(),
            None => false,
        };
        self.calls.lock().unwrap().push(Dispatched::Legacy {
            job: job.clone(),
            captain_video_existed,
        });
        Ok(())
    }
}

pub struct TestContext {
    pub state: web::Data<AppState>,
    pub repo: Arc<MemoryRepository>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub jobs: mpsc::Receiver<TranscodeJob>,
    pub blob_dir: TempDir,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.public_base_url = "http://test.local/media".to_string();
    config.storage.short_video_max_bytes = 1024;
    config.storage.max_file_size = 64 * 1024;
    config.pipeline.allow_open_internal = true;
    config
}

pub fn context() -> TestContext {
    context_with(test_config())
}

pub fn context_with(config: AppConfig) -> TestContext {
    let blob_dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(MemoryRepository::new());
    let dispatcher = Arc::new(RecordingDispatcher {
        repo: repo.clone(),
        calls: Mutex::new(Vec::new()),
    });
    let (tx, rx) = mpsc::channel(16);
    let limiter = RateLimiter::per_minute(config.finalize.rate_limit_per_minute);
    let state = AppState {
        blobs: LocalBlobStore::new(blob_dir.path(), config.storage.public_base_url.clone()),
        config: Arc::new(config),
        repo: repo.clone(),
        dispatcher: dispatcher.clone(),
        telemetry: Arc::new(MediaTelemetry::new()),
        jobs: tx,
        finalize_limiter: Arc::new(limiter),
    };
    TestContext {
        state: web::Data::new(state),
        repo,
        dispatcher,
        jobs: rx,
        blob_dir,
    }
}

/// Initialise the app for a [`TestContext`] the same way `main` does.
macro_rules! init_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new().configure(charter_media::configure_app($ctx.state.clone())),
        )
        .await
    };
}

/// Multipart body with text fields and at most one file part.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(user: Uuid, body: Vec<u8>) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/api/v1/uploads")
        .insert_header(("x-user-id", user.to_string()))
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body)
}
