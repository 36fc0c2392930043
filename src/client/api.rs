//! reqwest client for the service's JSON endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::config::ClientConfig;
use super::draft::{DraftApi, DraftSaveError};
use super::finalize::{FinalizeApi, SubmitError};
use super::poller::{PendingMediaPoller, PendingStatusSource};
use super::upload_queue::UploadQueue;
use super::uploader::HttpUploader;
use crate::domain::charter::{
    CharterMediaUpdate, FinalizeErrorBody, FinalizeRequest, FinalizeResponse,
};
use crate::domain::draft::{DraftEnvelope, DraftPatchRequest, DraftView};
use crate::domain::media::{PendingStatusItem, PendingStatusResponse};

pub use crate::api::auth::USER_ID_HEADER;
pub use crate::api::drafts::DRAFT_VERSION_HEADER;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ErrorBody {
    error: Option<String>,
    current_version: Option<i32>,
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Multipart uploader sharing this client's connection pool.
    pub fn uploader(&self) -> HttpUploader {
        HttpUploader::new(
            self.client.clone(),
            self.config.endpoint("uploads"),
            self.config.user_id,
        )
    }

    /// Poller over this client's pending-status endpoint.
    pub fn poller(&self) -> PendingMediaPoller {
        PendingMediaPoller::new(
            Arc::new(self.clone()),
            self.config.poll_interval(),
            self.config.max_poll_attempts,
        )
    }

    /// Upload queue backed by the configured store directory. Call
    /// [`UploadQueue::restore`] before use.
    pub fn upload_queue(&self) -> UploadQueue {
        UploadQueue::new(
            self.config.queue_store(),
            Arc::new(self.uploader()),
            self.config.queue_max_age(),
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(USER_ID_HEADER, self.config.user_id.to_string())
    }

    async fn draft_response(response: Response) -> Result<DraftView, DraftSaveError> {
        let status = response.status();
        if status.is_success() {
            let envelope: DraftEnvelope = response
                .json()
                .await
                .map_err(|e| DraftSaveError::Payload(e.to_string()))?;
            return Ok(envelope.draft);
        }
        let body: ErrorBody = response.json().await.unwrap_or_default();
        if status == StatusCode::CONFLICT {
            return Err(DraftSaveError::Conflict {
                current_version: body.current_version,
            });
        }
        Err(DraftSaveError::Status {
            status: status.as_u16(),
            code: body.error.unwrap_or_else(|| "draft_request_failed".to_string()),
        })
    }

    async fn submit_response<T: DeserializeOwned>(response: Response) -> Result<T, SubmitError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| SubmitError::Transport(e.to_string()));
        }
        let body: FinalizeErrorBody = response.json().await.unwrap_or_default();
        Err(SubmitError::Server {
            status: status.as_u16(),
            code: if body.error.is_empty() {
                "unknown".to_string()
            } else {
                body.error
            },
            message: body.message,
            request_id: body.request_id,
            issues: body.issues,
        })
    }
}

fn transport(e: reqwest::Error) -> DraftSaveError {
    DraftSaveError::Transport(e.to_string())
}

#[async_trait]
impl DraftApi for ApiClient {
    async fn create_draft(&self) -> Result<DraftView, DraftSaveError> {
        let response = self
            .authed(self.client.post(self.config.endpoint("drafts")))
            .send()
            .await
            .map_err(transport)?;
        Self::draft_response(response).await
    }

    async fn fetch_draft(&self, id: &str) -> Result<DraftView, DraftSaveError> {
        let response = self
            .authed(self.client.get(self.config.endpoint(&format!("drafts/{id}"))))
            .send()
            .await
            .map_err(transport)?;
        Self::draft_response(response).await
    }

    async fn patch_draft(
        &self,
        id: &str,
        body: &DraftPatchRequest,
    ) -> Result<DraftView, DraftSaveError> {
        let response = self
            .authed(self.client.patch(self.config.endpoint(&format!("drafts/{id}"))))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        Self::draft_response(response).await
    }
}

#[async_trait]
impl FinalizeApi for ApiClient {
    async fn finalize(
        &self,
        draft_id: &str,
        version: i32,
        request: &FinalizeRequest,
    ) -> Result<FinalizeResponse, SubmitError> {
        let url = self.config.endpoint(&format!("drafts/{draft_id}/finalize"));
        let response = self
            .authed(self.client.post(url))
            .header(DRAFT_VERSION_HEADER, version.to_string())
            .json(request)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        Self::submit_response(response).await
    }

    async fn put_charter_media(
        &self,
        charter_id: &str,
        update: &CharterMediaUpdate,
    ) -> Result<(), SubmitError> {
        let url = self.config.endpoint(&format!("charters/{charter_id}/media"));
        let response = self
            .authed(self.client.put(url))
            .json(update)
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        Self::submit_response::<serde_json::Value>(response)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl PendingStatusSource for ApiClient {
    async fn fetch_status(&self, ids: &[String]) -> anyhow::Result<Vec<PendingStatusItem>> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        let response = self
            .authed(self.client.get(self.config.endpoint("media/pending")))
            .query(&query)
            .send()
            .await?
            .error_for_status()?;
        let body: PendingStatusResponse = response.json().await?;
        Ok(body.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::form::LocalFile;

    fn client(queue_dir: &std::path::Path) -> ApiClient {
        ApiClient::new(ClientConfig {
            queue_store_path: Some(queue_dir.to_path_buf()),
            ..ClientConfig::default()
        })
    }

    #[tokio::test]
    async fn upload_queue_persists_under_the_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let queue = client(dir.path()).upload_queue();
        assert_eq!(queue.restore().await, 0);
        queue
            .enqueue(LocalFile::new("reel.mp4", "video/mp4", 1, b"mp4".to_vec()))
            .await;

        let reopened = client(dir.path()).upload_queue();
        assert_eq!(reopened.restore().await, 1);
        assert_eq!(reopened.items()[0].file.name, "reel.mp4");
    }

    #[tokio::test]
    async fn poller_starts_idle() {
        let dir = tempfile::tempdir().unwrap();
        let poller = client(dir.path()).poller();
        assert!(!poller.is_running());
        assert!(poller.snapshot().is_empty());
    }
}
