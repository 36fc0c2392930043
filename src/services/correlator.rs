//! Transcode dispatch for both pipelines.
//!
//! The new pipeline only needs the `CaptainVideo` id. The legacy job payload
//! carries that id as `captainVideoId` so either side can be traced back to
//! the other. Calls are single-shot: no retries here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PipelineConfig;

/// Header carrying the shared secret for the internal pipeline endpoints.
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Body of `POST /media/queue`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueVideoRequest {
    pub video_id: Uuid,
}

/// Body of `POST /transcode/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeJobRequest {
    pub original_key: String,
    pub original_url: String,
    pub charter_id: String,
    pub filename: String,
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captain_video_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("dispatch transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Enqueue a `CaptainVideo` on the new pipeline.
    async fn enqueue_video(&self, video_id: Uuid) -> Result<(), DispatchError>;

    /// Submit a job to the legacy transcode endpoint.
    async fn submit_transcode_job(&self, job: &TranscodeJobRequest) -> Result<(), DispatchError>;
}

pub struct HttpJobDispatcher {
    client: reqwest::Client,
    queue_url: String,
    transcode_job_url: String,
    internal_token: String,
}

impl HttpJobDispatcher {
    pub fn new(config: &PipelineConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.dispatch_timeout_secs))
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            queue_url: config.queue_url.clone(),
            transcode_job_url: config.transcode_job_url.clone(),
            internal_token: config.internal_token.clone(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), DispatchError> {
        let mut request = self.client.post(url).json(body);
        if !self.internal_token.is_empty() {
            request = request.header(INTERNAL_TOKEN_HEADER, &self.internal_token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DispatchError::Status { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl JobDispatcher for HttpJobDispatcher {
    async fn enqueue_video(&self, video_id: Uuid) -> Result<(), DispatchError> {
        self.post(&self.queue_url, &QueueVideoRequest { video_id })
            .await
    }

    async fn submit_transcode_job(&self, job: &TranscodeJobRequest) -> Result<(), DispatchError> {
        self.post(&self.transcode_job_url, job).await
    }
}
