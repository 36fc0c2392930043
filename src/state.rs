use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Repository;
use crate::services::finalize::RateLimiter;
use crate::services::video_processor::JobSender;
use crate::services::{JobDispatcher, MediaRegistrar, MediaTelemetry};
use crate::storage::LocalBlobStore;

/// Shared handles injected into every handler as `web::Data<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Arc<dyn Repository>,
    pub blobs: LocalBlobStore,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub telemetry: Arc<MediaTelemetry>,
    pub jobs: JobSender,
    pub finalize_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn registrar(&self) -> MediaRegistrar {
        MediaRegistrar::new(
            self.repo.clone(),
            self.dispatcher.clone(),
            self.telemetry.clone(),
        )
    }
}
