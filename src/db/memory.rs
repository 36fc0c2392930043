//! In-process repository used when no database URL is configured and by
//! the test suites. Faults can be injected per operation to exercise the
//! failure paths of the media pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::models::{
    CaptainProfile, CaptainVideo, CaptainVideoUpdate, Charter, CharterDraft, CharterMedia,
    PendingMedia, PendingMediaUpdate,
};
use super::repository::{claim_error, plan_media_order, RepoError, RepoResult, Repository};
use crate::domain::draft::{merge_partial, DraftStatus};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    NextSortOrder,
    InsertCharterMedia,
    InsertCaptainVideo,
    InsertPendingMedia,
    PatchDraft,
}

#[derive(Default)]
struct Tables {
    charter_media: Vec<CharterMedia>,
    captain_videos: HashMap<Uuid, CaptainVideo>,
    pending_media: HashMap<Uuid, PendingMedia>,
    drafts: HashMap<Uuid, CharterDraft>,
    profiles: HashMap<Uuid, CaptainProfile>,
    charters: HashMap<Uuid, Charter>,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    faults: Mutex<HashSet<FaultPoint>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `point` fail until `clear_fault`.
    pub fn inject_fault(&self, point: FaultPoint) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(point);
    }

    pub fn clear_fault(&self, point: FaultPoint) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&point);
    }

    fn check(&self, point: FaultPoint) -> RepoResult<()> {
        let faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        if faults.contains(&point) {
            Err(RepoError::Database(format!("injected fault at {point:?}")))
        } else {
            Ok(())
        }
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Total rows across the media tables; lets tests assert "nothing written".
    pub fn media_row_count(&self) -> usize {
        let t = self.tables();
        t.charter_media.len() + t.captain_videos.len() + t.pending_media.len()
    }

    pub fn captain_video_count(&self) -> usize {
        self.tables().captain_videos.len()
    }

    pub fn charter_media_snapshot(&self) -> Vec<CharterMedia> {
        self.tables().charter_media.clone()
    }

    pub fn pending_snapshot(&self) -> Vec<PendingMedia> {
        self.tables().pending_media.values().cloned().collect()
    }

    pub fn charter_count(&self) -> usize {
        self.tables().charters.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn next_sort_order(&self, charter_id: &str) -> RepoResult<i32> {
        self.check(FaultPoint::NextSortOrder)?;
        let t = self.tables();
        Ok(t.charter_media
            .iter()
            .filter(|m| m.charter_id == charter_id)
            .map(|m| m.sort_order)
            .max()
            .map(|max| max + 1)
            .unwrap_or(0))
    }

    async fn insert_charter_media(&self, media: CharterMedia) -> RepoResult<CharterMedia> {
        self.check(FaultPoint::InsertCharterMedia)?;
        self.tables().charter_media.push(media.clone());
        Ok(media)
    }

    async fn list_charter_media(&self, charter_id: &str) -> RepoResult<Vec<CharterMedia>> {
        let mut rows: Vec<CharterMedia> = self
            .tables()
            .charter_media
            .iter()
            .filter(|m| m.charter_id == charter_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.sort_order);
        Ok(rows)
    }

    async fn replace_charter_media(
        &self,
        charter_id: &str,
        desired: Vec<CharterMedia>,
        delete_keys: &[String],
    ) -> RepoResult<Vec<CharterMedia>> {
        let mut t = self.tables();
        let (existing, others): (Vec<_>, Vec<_>) = std::mem::take(&mut t.charter_media)
            .into_iter()
            .partition(|m| m.charter_id == charter_id);
        let planned = plan_media_order(existing, desired, delete_keys);
        t.charter_media = others;
        t.charter_media.extend(planned.iter().cloned());
        Ok(planned)
    }

    async fn mark_charter_media_processed(
        &self,
        storage_key: &str,
        url: &str,
        thumbnail_url: Option<&str>,
        duration_seconds: Option<f64>,
    ) -> RepoResult<usize> {
        let mut t = self.tables();
        let mut touched = 0;
        for media in t
            .charter_media
            .iter_mut()
            .filter(|m| m.storage_key == storage_key)
        {
            media.url = url.to_string();
            media.thumbnail_url = thumbnail_url.map(str::to_string);
            media.duration_seconds = duration_seconds;
            touched += 1;
        }
        Ok(touched)
    }

    async fn insert_captain_video(&self, video: CaptainVideo) -> RepoResult<CaptainVideo> {
        self.check(FaultPoint::InsertCaptainVideo)?;
        self.tables().captain_videos.insert(video.id, video.clone());
        Ok(video)
    }

    async fn get_captain_video(&self, id: Uuid) -> RepoResult<Option<CaptainVideo>> {
        Ok(self.tables().captain_videos.get(&id).cloned())
    }

    async fn update_captain_video(
        &self,
        id: Uuid,
        update: CaptainVideoUpdate,
    ) -> RepoResult<CaptainVideo> {
        let mut t = self.tables();
        let video = t
            .captain_videos
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("captain_video", id))?;
        if let Some(v) = update.process_status {
            video.process_status = v;
        }
        if let Some(v) = update.ready_720p_url {
            video.ready_720p_url = Some(v);
        }
        if let Some(v) = update.thumbnail_url {
            video.thumbnail_url = Some(v);
        }
        if let Some(v) = update.processed_duration_sec {
            video.processed_duration_sec = Some(v);
        }
        if let Some(v) = update.error_message {
            video.error_message = Some(v);
        }
        video.updated_at = update.updated_at.unwrap_or_else(|| Utc::now().naive_utc());
        Ok(video.clone())
    }

    async fn list_captain_videos(
        &self,
        owner_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> RepoResult<(Vec<CaptainVideo>, i64)> {
        let t = self.tables();
        let mut owned: Vec<CaptainVideo> = t
            .captain_videos
            .values()
            .filter(|v| v.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_pending_media(&self, pending: PendingMedia) -> RepoResult<PendingMedia> {
        self.check(FaultPoint::InsertPendingMedia)?;
        self.tables().pending_media.insert(pending.id, pending.clone());
        Ok(pending)
    }

    async fn get_pending_media(&self, id: Uuid) -> RepoResult<Option<PendingMedia>> {
        Ok(self.tables().pending_media.get(&id).cloned())
    }

    async fn find_pending_media(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> RepoResult<Vec<PendingMedia>> {
        let t = self.tables();
        Ok(ids
            .iter()
            .filter_map(|id| t.pending_media.get(id))
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update_pending_media(
        &self,
        id: Uuid,
        update: PendingMediaUpdate,
    ) -> RepoResult<PendingMedia> {
        let mut t = self.tables();
        let pending = t
            .pending_media
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("pending_media", id))?;
        if let Some(v) = update.status {
            pending.status = v;
        }
        if let Some(v) = update.final_key {
            pending.final_key = Some(v);
        }
        if let Some(v) = update.final_url {
            pending.final_url = Some(v);
        }
        if let Some(v) = update.thumbnail_key {
            pending.thumbnail_key = Some(v);
        }
        if let Some(v) = update.thumbnail_url {
            pending.thumbnail_url = Some(v);
        }
        if let Some(v) = update.correlation_id {
            pending.correlation_id = Some(v);
        }
        if let Some(v) = update.error {
            pending.error = Some(v);
        }
        if let Some(v) = update.duration_seconds {
            pending.duration_seconds = Some(v);
        }
        pending.updated_at = update.updated_at.unwrap_or_else(|| Utc::now().naive_utc());
        Ok(pending.clone())
    }

    async fn insert_draft(&self, draft: CharterDraft) -> RepoResult<CharterDraft> {
        self.tables().drafts.insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn get_draft(&self, id: Uuid) -> RepoResult<Option<CharterDraft>> {
        Ok(self.tables().drafts.get(&id).cloned())
    }

    async fn patch_draft(
        &self,
        id: Uuid,
        client_version: i32,
        data_partial: Value,
        current_step: i32,
    ) -> RepoResult<CharterDraft> {
        self.check(FaultPoint::PatchDraft)?;
        let mut t = self.tables();
        let draft = t
            .drafts
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("charter_draft", id))?;
        if draft.version != client_version {
            return Err(RepoError::VersionConflict {
                client: client_version,
                current: draft.version,
            });
        }
        merge_partial(&mut draft.data, data_partial);
        let now = Utc::now().naive_utc();
        draft.version += 1;
        draft.current_step = current_step;
        draft.last_touched_at = now;
        draft.updated_at = now;
        Ok(draft.clone())
    }

    async fn get_captain_profile(&self, user_id: Uuid) -> RepoResult<Option<CaptainProfile>> {
        Ok(self
            .tables()
            .profiles
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn insert_captain_profile(&self, profile: CaptainProfile) -> RepoResult<CaptainProfile> {
        let mut t = self.tables();
        if t.profiles.values().any(|p| p.user_id == profile.user_id) {
            return Err(RepoError::Database(format!(
                "captain profile for user {} already exists",
                profile.user_id
            )));
        }
        t.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn get_charter(&self, id: Uuid) -> RepoResult<Option<Charter>> {
        Ok(self.tables().charters.get(&id).cloned())
    }

    async fn create_charter_from_draft(
        &self,
        draft_id: Uuid,
        draft_version: i32,
        charter: Charter,
        media: Vec<CharterMedia>,
    ) -> RepoResult<Charter> {
        let mut t = self.tables();
        let draft = t
            .drafts
            .get_mut(&draft_id)
            .ok_or_else(|| RepoError::not_found("charter_draft", draft_id))?;
        if draft.draft_status() != DraftStatus::Draft || draft.version != draft_version {
            return Err(claim_error(draft_id, draft_version, Some(&*draft)));
        }
        draft.status = DraftStatus::Submitted.as_str().to_string();
        draft.updated_at = Utc::now().naive_utc();
        t.charters.insert(charter.id, charter.clone());
        t.charter_media.extend(media);
        Ok(charter)
    }
}
