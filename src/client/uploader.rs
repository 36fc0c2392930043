//! Multipart upload of local files with per-file progress.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use uuid::Uuid;

use super::api::USER_ID_HEADER;
use super::form::{FileId, LocalFile};

const CHUNK_SIZE: usize = 64 * 1024;

/// Purpose of an upload, sent as `docType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    CharterMedia,
    Avatar,
    VerificationDoc,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharterMedia => "charter_media",
            Self::Avatar => "avatar",
            Self::VerificationDoc => "verification_doc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub doc_type: DocKind,
    pub charter_id: Option<String>,
    pub short_video: bool,
    pub overwrite: bool,
}

impl UploadRequest {
    pub fn charter_media(charter_id: Option<String>) -> Self {
        Self {
            doc_type: DocKind::CharterMedia,
            charter_id,
            short_video: false,
            overwrite: false,
        }
    }

    pub fn avatar() -> Self {
        Self {
            doc_type: DocKind::Avatar,
            charter_id: None,
            short_video: false,
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub key: String,
    pub url: String,
    #[serde(default)]
    pub pending_id: Option<Uuid>,
    #[serde(default)]
    pub captain_video_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    limit_bytes: Option<u64>,
    size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    #[error("upload rejected ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
        limit_bytes: Option<u64>,
        size_bytes: Option<u64>,
    },
    #[error("upload transport error: {0}")]
    Transport(String),
    #[error("unexpected upload response: {0}")]
    InvalidResponse(String),
}

impl UploadError {
    /// Client errors never succeed on retry; server and network errors might.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => (400..500).contains(status) && *status != 429,
            Self::Transport(_) => false,
            Self::InvalidResponse(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Uploading(u8),
    Done,
    /// Frozen at the last progress seen before the failure.
    Failed(u8),
}

/// Upload progress keyed by stable file id.
#[derive(Debug, Clone, Default)]
pub struct ProgressMap {
    inner: Arc<Mutex<HashMap<FileId, ProgressState>>>,
}

impl ProgressMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HashMap<FileId, ProgressState>) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn get(&self, id: &FileId) -> Option<ProgressState> {
        self.with(|m| m.get(id).copied())
    }

    pub fn set_progress(&self, id: &FileId, percent: u8) {
        self.with(|m| {
            m.insert(id.clone(), ProgressState::Uploading(percent.min(100)));
        });
    }

    pub fn complete(&self, id: &FileId) {
        self.with(|m| {
            m.insert(id.clone(), ProgressState::Done);
        });
    }

    pub fn fail(&self, id: &FileId) {
        self.with(|m| {
            let last = match m.get(id) {
                Some(ProgressState::Uploading(p)) | Some(ProgressState::Failed(p)) => *p,
                Some(ProgressState::Done) => 100,
                None => 0,
            };
            m.insert(id.clone(), ProgressState::Failed(last));
        });
    }

    pub fn remove(&self, id: &FileId) {
        self.with(|m| {
            m.remove(id);
        });
    }

    pub fn snapshot(&self) -> HashMap<FileId, ProgressState> {
        self.with(|m| m.clone())
    }
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(
        &self,
        file: &LocalFile,
        request: &UploadRequest,
        progress: Option<&ProgressMap>,
    ) -> Result<UploadResult, UploadError>;
}

pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
    user_id: Uuid,
}

impl HttpUploader {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            user_id,
        }
    }
}

/// Percent of `sent` over `total`; an empty file counts as fully sent.
fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) * 100) / total) as u8
}

fn progress_body(file: &LocalFile, progress: Option<ProgressMap>) -> Body {
    let total = file.size();
    let sent = Arc::new(AtomicU64::new(0));
    let id = file.id.clone();
    let chunks: Vec<Vec<u8>> = file.bytes.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();

    let counted = stream::iter(chunks.into_iter().map(move |chunk| {
        let now = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
        if let Some(map) = &progress {
            // 100 is reserved for a confirmed response.
            map.set_progress(&id, percent(now, total).min(99));
        }
        Ok::<_, std::io::Error>(chunk)
    }));
    Body::wrap_stream(counted)
}

#[async_trait]
impl MediaUploader for HttpUploader {
    async fn upload(
        &self,
        file: &LocalFile,
        request: &UploadRequest,
        progress: Option<&ProgressMap>,
    ) -> Result<UploadResult, UploadError> {
        if let Some(map) = progress {
            map.set_progress(&file.id, 0);
        }
        let fail = |e: UploadError| {
            if let Some(map) = progress {
                map.fail(&file.id);
            }
            e
        };

        let part = Part::stream_with_length(progress_body(file, progress.cloned()), file.size())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .or_else(|_| {
                Part::stream_with_length(progress_body(file, progress.cloned()), file.size())
                    .file_name(file.name.clone())
                    .mime_str("application/octet-stream")
            })
            .map_err(|e| fail(UploadError::InvalidResponse(e.to_string())))?;

        let mut form = Form::new()
            .part("file", part)
            .text("docType", request.doc_type.as_str());
        if let Some(charter_id) = &request.charter_id {
            form = form.text("charterId", charter_id.clone());
        }
        if request.short_video {
            form = form.text("shortVideo", "true");
        }
        if request.overwrite {
            form = form.text("overwrite", "true");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header(USER_ID_HEADER, self.user_id.to_string())
            .multipart(form)
            .send()
            .await
            .map_err(|e| fail(UploadError::Transport(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            log::warn!(
                "Upload of {} rejected with {}: {:?}",
                file.name,
                status,
                body.error
            );
            return Err(fail(UploadError::Rejected {
                status: status.as_u16(),
                code: body.error.unwrap_or_else(|| "upload_failed".to_string()),
                message: body
                    .message
                    .unwrap_or_else(|| format!("Upload failed with status {status}")),
                limit_bytes: body.limit_bytes,
                size_bytes: body.size_bytes,
            }));
        }

        let result: UploadResult = response
            .json()
            .await
            .map_err(|e| fail(UploadError::InvalidResponse(e.to_string())))?;
        if let Some(map) = progress {
            map.complete(&file.id);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_freezes_last_progress() {
        let map = ProgressMap::new();
        let a = FileId("a".into());
        let b = FileId("b".into());
        map.set_progress(&a, 42);
        map.set_progress(&b, 10);
        map.fail(&a);
        map.complete(&b);

        assert_eq!(map.get(&a), Some(ProgressState::Failed(42)));
        assert_eq!(map.get(&b), Some(ProgressState::Done));
    }

    #[test]
    fn progress_is_keyed_by_id_not_position() {
        let map = ProgressMap::new();
        let ids: Vec<FileId> = (0..3).map(|i| FileId(format!("f{i}"))).collect();
        for (i, id) in ids.iter().enumerate() {
            map.set_progress(id, (i * 10) as u8);
        }
        map.remove(&ids[0]);
        assert_eq!(map.get(&ids[2]), Some(ProgressState::Uploading(20)));
        assert_eq!(map.snapshot().len(), 2);
    }

    #[test]
    fn percent_handles_empty_and_overshoot() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(300, 200), 100);
    }

    #[test]
    fn client_errors_are_permanent() {
        let rejected = |status| UploadError::Rejected {
            status,
            code: "x".into(),
            message: "x".into(),
            limit_bytes: None,
            size_bytes: None,
        };
        assert!(rejected(413).is_permanent());
        assert!(!rejected(503).is_permanent());
        assert!(!rejected(429).is_permanent());
        assert!(!UploadError::Transport("reset".into()).is_permanent());
    }
}
