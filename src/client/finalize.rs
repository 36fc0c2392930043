//! Submit flow: upload what is still local, then finalize the draft.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::draft::DraftSnapshotManager;
use super::form::{FileIdentity, LocalFile, MediaSlot, SharedForm};
use super::uploader::{MediaUploader, UploadError, UploadRequest};
use crate::domain::charter::{
    CharterMediaLists, CharterMediaUpdate, FinalizeMedia, FinalizeRequest, FinalizeResponse,
};
use crate::domain::media::MediaRef;
use crate::storage::keys::{is_storage_key, key_from_url};

pub const GENERIC_FAILURE: &str = "We couldn't submit your charter. Please try again.";

/// User-facing copy for finalize error codes.
pub fn message_for_code(code: &str) -> &'static str {
    match code {
        "rate_limited" => "You're submitting too quickly. Please wait a minute and try again.",
        "unauthorized" => "Your session has expired. Please sign in again.",
        "not_found" => "We couldn't find your draft. It may already have been submitted.",
        "invalid_draft_data" => "Your saved draft is damaged. Please review each step and resubmit.",
        "missing_captain_profile" => "Please complete your captain profile before submitting.",
        "validation" => "Some details are missing or invalid. Please review the highlighted fields.",
        "version_conflict" => "Your draft changed in another window. Please review and resubmit.",
        _ => GENERIC_FAILURE,
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("upload of {file} failed: {source}")]
    Upload { file: String, source: UploadError },
    #[error("server rejected submission ({status} {code})")]
    Server {
        status: u16,
        code: String,
        message: Option<String>,
        request_id: Option<String>,
        issues: Option<BTreeMap<String, Vec<String>>>,
    },
    #[error("submission transport error: {0}")]
    Transport(String),
    #[error("no draft to finalize")]
    NoDraft,
}

impl SubmitError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Server { code, .. } => message_for_code(code),
            Self::Upload { .. } => "One of your files failed to upload. Please try again.",
            Self::Transport(_) | Self::NoDraft => GENERIC_FAILURE,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Server { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait FinalizeApi: Send + Sync {
    async fn finalize(
        &self,
        draft_id: &str,
        version: i32,
        request: &FinalizeRequest,
    ) -> Result<FinalizeResponse, SubmitError>;

    async fn put_charter_media(
        &self,
        charter_id: &str,
        update: &CharterMediaUpdate,
    ) -> Result<(), SubmitError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitMode {
    Create,
    Edit {
        charter_id: String,
        delete_keys: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    ThankYou,
    Manage(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeOutcome {
    pub redirect: Redirect,
    pub charter_id: Option<String>,
}

/// Keep storage keys; otherwise recover one from the URL, or pass through.
pub fn sanitize_ref(media: &MediaRef) -> MediaRef {
    if is_storage_key(&media.name) {
        return media.clone();
    }
    match key_from_url(&media.url) {
        Some(key) => MediaRef::new(key, media.url.clone()),
        None => media.clone(),
    }
}

/// Like [`sanitize_ref`] but drops what cannot be normalized.
pub fn sanitize_avatar(media: &MediaRef) -> Option<MediaRef> {
    if is_storage_key(&media.name) {
        return Some(media.clone());
    }
    key_from_url(&media.url).map(|key| MediaRef::new(key, media.url.clone()))
}

pub struct FinalizeOrchestrator {
    uploader: Arc<dyn MediaUploader>,
    api: Arc<dyn FinalizeApi>,
    drafts: Arc<DraftSnapshotManager>,
    form: SharedForm,
    mode: SubmitMode,
    uploaded: Mutex<HashMap<FileIdentity, MediaRef>>,
    last_request_id: Mutex<Option<String>>,
}

impl FinalizeOrchestrator {
    pub fn new(
        uploader: Arc<dyn MediaUploader>,
        api: Arc<dyn FinalizeApi>,
        drafts: Arc<DraftSnapshotManager>,
        form: SharedForm,
        mode: SubmitMode,
    ) -> Self {
        Self {
            uploader,
            api,
            drafts,
            form,
            mode,
            uploaded: Mutex::new(HashMap::new()),
            last_request_id: Mutex::new(None),
        }
    }

    /// Request id of the last failed submission, for support.
    pub fn last_request_id(&self) -> Option<String> {
        self.last_request_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn media_scope(&self) -> Option<String> {
        match &self.mode {
            SubmitMode::Edit { charter_id, .. } => Some(charter_id.clone()),
            SubmitMode::Create => self.drafts.pointer().map(|p| p.id),
        }
    }

    pub async fn submit(&self) -> Result<FinalizeOutcome, SubmitError> {
        let result = self.try_submit().await;
        match &result {
            Ok(outcome) => {
                self.form.lock().unwrap_or_else(|e| e.into_inner()).reset();
                self.drafts.clear();
                self.uploaded
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clear();
                log::info!("Charter submitted: {:?}", outcome.redirect);
            }
            Err(e) => {
                if let Some(id) = e.request_id() {
                    *self.last_request_id.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(id.to_string());
                }
                log::warn!("Charter submission failed: {}", e);
            }
        }
        result
    }

    async fn upload_once(
        &self,
        file: &LocalFile,
        request: &UploadRequest,
    ) -> Result<MediaRef, SubmitError> {
        let identity = file.identity();
        let known = self
            .uploaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&identity)
            .cloned();
        if let Some(media) = known {
            return Ok(media);
        }
        let result = self
            .uploader
            .upload(file, request, None)
            .await
            .map_err(|source| SubmitError::Upload {
                file: file.name.clone(),
                source,
            })?;
        let media = MediaRef::new(result.key, result.url);
        self.uploaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity, media.clone());
        Ok(media)
    }

    /// Upload every local slot and swap it for its uploaded reference.
    async fn upload_locals(&self) -> Result<(), SubmitError> {
        let (locals, avatar) = {
            let form = self.form.lock().unwrap_or_else(|e| e.into_inner());
            let locals: Vec<LocalFile> = form
                .photos
                .iter()
                .chain(form.videos.iter())
                .filter_map(|slot| match slot {
                    MediaSlot::Local(file) => Some(file.clone()),
                    MediaSlot::Uploaded(_) => None,
                })
                .collect();
            let avatar = match &form.avatar {
                Some(MediaSlot::Local(file)) => Some(file.clone()),
                _ => None,
            };
            (locals, avatar)
        };

        let media_request = UploadRequest::charter_media(self.media_scope());
        let mut done = Vec::with_capacity(locals.len());
        for file in &locals {
            done.push((file.id.clone(), self.upload_once(file, &media_request).await?));
        }
        let avatar = match avatar {
            Some(file) => Some((
                file.id.clone(),
                self.upload_once(&file, &UploadRequest::avatar()).await?,
            )),
            None => None,
        };

        let mut guard = self.form.lock().unwrap_or_else(|e| e.into_inner());
        let form = &mut *guard;
        for slot in form.photos.iter_mut().chain(form.videos.iter_mut()) {
            let uploaded = match slot {
                MediaSlot::Local(file) => done.iter().find(|(id, _)| *id == file.id),
                MediaSlot::Uploaded(_) => None,
            };
            if let Some((_, media)) = uploaded {
                *slot = MediaSlot::Uploaded(media.clone());
            }
        }
        if let Some((id, media)) = avatar {
            if matches!(&form.avatar, Some(MediaSlot::Local(file)) if file.id == id) {
                form.avatar = Some(MediaSlot::Uploaded(media));
            }
        }
        Ok(())
    }

    fn build_media(&self) -> FinalizeMedia {
        let form = self.form.lock().unwrap_or_else(|e| e.into_inner());
        let refs = |slots: &[MediaSlot]| -> Vec<MediaRef> {
            slots
                .iter()
                .filter_map(MediaSlot::uploaded)
                .map(sanitize_ref)
                .collect()
        };
        let images = refs(&form.photos);
        let videos = refs(&form.videos);
        FinalizeMedia {
            images_order: form
                .images_order
                .clone()
                .unwrap_or_else(|| (0..images.len()).collect()),
            videos_order: (0..videos.len()).collect(),
            images_cover_index: form.images_cover_index,
            avatar: form
                .avatar
                .as_ref()
                .and_then(MediaSlot::uploaded)
                .and_then(sanitize_avatar),
            images,
            videos,
        }
    }

    async fn try_submit(&self) -> Result<FinalizeOutcome, SubmitError> {
        self.upload_locals().await?;
        let media = self.build_media();

        match &self.mode {
            SubmitMode::Create => {
                if let Err(e) = self.drafts.save().await {
                    log::warn!("Pre-finalize draft save failed: {}", e);
                }
                let pointer = self.drafts.pointer().ok_or(SubmitError::NoDraft)?;
                let response = self
                    .api
                    .finalize(&pointer.id, pointer.version, &FinalizeRequest { media })
                    .await?;
                Ok(FinalizeOutcome {
                    redirect: Redirect::ThankYou,
                    charter_id: Some(response.charter_id),
                })
            }
            SubmitMode::Edit {
                charter_id,
                delete_keys,
            } => {
                let update = CharterMediaUpdate {
                    media: CharterMediaLists {
                        images: media.images,
                        videos: media.videos,
                    },
                    delete_keys: delete_keys.clone(),
                };
                self.api.put_charter_media(charter_id, &update).await?;
                Ok(FinalizeOutcome {
                    redirect: Redirect::Manage(charter_id.clone()),
                    charter_id: Some(charter_id.clone()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::draft::{DraftApi, DraftPointer, DraftSaveError};
    use crate::client::form::CharterForm;
    use crate::client::uploader::{ProgressMap, UploadResult};
    use crate::domain::draft::{DraftPatchRequest, DraftStatus, DraftView};

    #[derive(Default)]
    struct CountingUploader {
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl MediaUploader for CountingUploader {
        async fn upload(
            &self,
            file: &LocalFile,
            request: &UploadRequest,
            _progress: Option<&ProgressMap>,
        ) -> Result<UploadResult, UploadError> {
            self.calls
                .lock()
                .unwrap()
                .push((file.name.clone(), request.charter_id.clone()));
            let key = format!("captains/u1/media/{}", file.name);
            Ok(UploadResult {
                url: format!("http://blob/{key}"),
                key,
                pending_id: None,
                captain_video_id: None,
            })
        }
    }

    struct Drafts;

    #[async_trait]
    impl DraftApi for Drafts {
        async fn create_draft(&self) -> Result<DraftView, DraftSaveError> {
            unreachable!()
        }
        async fn fetch_draft(&self, _id: &str) -> Result<DraftView, DraftSaveError> {
            unreachable!()
        }
        async fn patch_draft(
            &self,
            id: &str,
            body: &DraftPatchRequest,
        ) -> Result<DraftView, DraftSaveError> {
            Ok(DraftView {
                id: id.to_string(),
                version: body.client_version + 1,
                current_step: body.current_step,
                status: DraftStatus::Draft,
                data: body.data_partial.clone(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingFinalize {
        requests: Mutex<Vec<(String, i32, FinalizeRequest)>>,
        reject_with: Option<SubmitError>,
    }

    #[async_trait]
    impl FinalizeApi for RecordingFinalize {
        async fn finalize(
            &self,
            draft_id: &str,
            version: i32,
            request: &FinalizeRequest,
        ) -> Result<FinalizeResponse, SubmitError> {
            self.requests
                .lock()
                .unwrap()
                .push((draft_id.to_string(), version, request.clone()));
            if let Some(err) = &self.reject_with {
                return Err(err.clone());
            }
            Ok(FinalizeResponse {
                ok: true,
                charter_id: "ch-1".into(),
                captain_profile_id: "cp-1".into(),
            })
        }

        async fn put_charter_media(
            &self,
            _charter_id: &str,
            _update: &CharterMediaUpdate,
        ) -> Result<(), SubmitError> {
            Ok(())
        }
    }

    fn setup(
        finalize: RecordingFinalize,
    ) -> (
        FinalizeOrchestrator,
        SharedForm,
        Arc<CountingUploader>,
        Arc<RecordingFinalize>,
    ) {
        let form = CharterForm::default().into_shared();
        let drafts = Arc::new(DraftSnapshotManager::new(Arc::new(Drafts), form.clone()));
        drafts.establish(DraftPointer {
            id: "draft-1".into(),
            version: 4,
        });
        let uploader = Arc::new(CountingUploader::default());
        let api = Arc::new(finalize);
        let orchestrator = FinalizeOrchestrator::new(
            uploader.clone(),
            api.clone(),
            drafts,
            form.clone(),
            SubmitMode::Create,
        );
        (orchestrator, form, uploader, api)
    }

    #[test]
    fn sanitizes_names_from_urls() {
        let odd = MediaRef::new("IMG_1.jpg", "https://cdn.example/charters/c1/media/1-img.jpg?x=1");
        assert_eq!(sanitize_ref(&odd).name, "charters/c1/media/1-img.jpg");

        let hopeless = MediaRef::new("IMG_1.jpg", "https://elsewhere/img.jpg");
        assert_eq!(sanitize_ref(&hopeless), hopeless);
        assert_eq!(sanitize_avatar(&hopeless), None);
    }

    #[test]
    fn unknown_codes_fall_back_to_generic_copy() {
        assert_eq!(message_for_code("teapot"), GENERIC_FAILURE);
        assert_ne!(message_for_code("rate_limited"), GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn uploads_locals_then_finalizes_with_saved_version() {
        let (orchestrator, form, uploader, api) = setup(RecordingFinalize::default());
        {
            let mut form = form.lock().unwrap();
            form.photos = vec![
                MediaSlot::Local(LocalFile::new("a.jpg", "image/jpeg", 1, vec![1])),
                MediaSlot::Uploaded(MediaRef::new("captains/u1/media/b.jpg", "http://blob/b")),
                MediaSlot::Local(LocalFile::new("c.jpg", "image/jpeg", 1, vec![3])),
            ];
            form.videos = vec![MediaSlot::Local(LocalFile::new("v.mp4", "video/mp4", 1, vec![4]))];
            form.avatar = Some(MediaSlot::Uploaded(MediaRef::new("me.png", "https://x/me.png")));
        }

        let outcome = orchestrator.submit().await.unwrap();
        assert_eq!(outcome.redirect, Redirect::ThankYou);
        assert_eq!(outcome.charter_id.as_deref(), Some("ch-1"));

        let calls = uploader.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, scope)| scope.as_deref() == Some("draft-1")));

        let requests = api.requests.lock().unwrap();
        let (draft_id, version, request) = &requests[0];
        assert_eq!(draft_id, "draft-1");
        // The forced save bumped 4 to 5 before finalizing.
        assert_eq!(*version, 5);
        assert_eq!(request.media.images.len(), 3);
        assert_eq!(request.media.images[0].name, "captains/u1/media/a.jpg");
        assert_eq!(request.media.videos.len(), 1);
        assert!(request.media.avatar.is_none());

        assert_eq!(*form.lock().unwrap(), CharterForm::default());
    }

    #[tokio::test]
    async fn failed_finalize_keeps_uploads_and_request_id() {
        let rejection = SubmitError::Server {
            status: 400,
            code: "validation".into(),
            message: None,
            request_id: Some("req-9".into()),
            issues: None,
        };
        let (orchestrator, form, uploader, _api) = setup(RecordingFinalize {
            reject_with: Some(rejection),
            ..RecordingFinalize::default()
        });
        form.lock().unwrap().photos =
            vec![MediaSlot::Local(LocalFile::new("a.jpg", "image/jpeg", 1, vec![1]))];

        let err = orchestrator.submit().await.unwrap_err();
        assert_eq!(err.user_message(), message_for_code("validation"));
        assert_eq!(orchestrator.last_request_id().as_deref(), Some("req-9"));

        // Uploaded slots were written back; a second submit does not re-upload.
        assert!(form.lock().unwrap().photos[0].uploaded().is_some());
        let _ = orchestrator.submit().await;
        assert_eq!(uploader.calls.lock().unwrap().len(), 1);
    }
}
