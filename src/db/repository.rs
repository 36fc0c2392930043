//! Persistence seam for the service.
//!
//! Handlers and services only see `Arc<dyn Repository>`; `PgRepository`
//! backs it with diesel-async, `MemoryRepository` with in-process maps.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::models::{
    CaptainProfile, CaptainVideo, CaptainVideoUpdate, Charter, CharterDraft, CharterMedia,
    PendingMedia, PendingMediaUpdate,
};
use crate::domain::draft::DraftStatus;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("version conflict: client sent {client}, current is {current}")]
    VersionConflict { client: i32, current: i32 },

    #[error("database error: {0}")]
    Database(String),

    #[error("connection pool error: {0}")]
    Pool(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<diesel::result::Error> for RepoError {
    fn from(e: diesel::result::Error) -> Self {
        RepoError::Database(e.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait Repository: Send + Sync {
    // --- legacy charter media ---

    /// `max(sort_order) + 1` over the charter's media, 0 when it has none.
    async fn next_sort_order(&self, charter_id: &str) -> RepoResult<i32>;

    async fn insert_charter_media(&self, media: CharterMedia) -> RepoResult<CharterMedia>;

    /// Media of one charter ordered by `sort_order`.
    async fn list_charter_media(&self, charter_id: &str) -> RepoResult<Vec<CharterMedia>>;

    /// Delete rows whose key is in `delete_keys`, upsert `desired` (matched by
    /// storage key) in the given order, keep any remaining rows after them,
    /// and renumber everything densely from 0. Runs atomically.
    async fn replace_charter_media(
        &self,
        charter_id: &str,
        desired: Vec<CharterMedia>,
        delete_keys: &[String],
    ) -> RepoResult<Vec<CharterMedia>>;

    /// Point legacy rows for `storage_key` at the processed output.
    async fn mark_charter_media_processed(
        &self,
        storage_key: &str,
        url: &str,
        thumbnail_url: Option<&str>,
        duration_seconds: Option<f64>,
    ) -> RepoResult<usize>;

    // --- captain videos ---

    async fn insert_captain_video(&self, video: CaptainVideo) -> RepoResult<CaptainVideo>;

    async fn get_captain_video(&self, id: Uuid) -> RepoResult<Option<CaptainVideo>>;

    async fn update_captain_video(
        &self,
        id: Uuid,
        update: CaptainVideoUpdate,
    ) -> RepoResult<CaptainVideo>;

    /// Newest first, with the owner's total count.
    async fn list_captain_videos(
        &self,
        owner_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> RepoResult<(Vec<CaptainVideo>, i64)>;

    // --- pending media ---

    async fn insert_pending_media(&self, pending: PendingMedia) -> RepoResult<PendingMedia>;

    async fn get_pending_media(&self, id: Uuid) -> RepoResult<Option<PendingMedia>>;

    /// Records among `ids` owned by `owner_id`; others are silently omitted.
    async fn find_pending_media(&self, owner_id: Uuid, ids: &[Uuid])
        -> RepoResult<Vec<PendingMedia>>;

    async fn update_pending_media(
        &self,
        id: Uuid,
        update: PendingMediaUpdate,
    ) -> RepoResult<PendingMedia>;

    // --- drafts ---

    async fn insert_draft(&self, draft: CharterDraft) -> RepoResult<CharterDraft>;

    async fn get_draft(&self, id: Uuid) -> RepoResult<Option<CharterDraft>>;

    /// Merge `data_partial` into the stored document when `client_version`
    /// matches, bumping the version by one. A stale version yields
    /// `RepoError::VersionConflict`.
    async fn patch_draft(
        &self,
        id: Uuid,
        client_version: i32,
        data_partial: Value,
        current_step: i32,
    ) -> RepoResult<CharterDraft>;

    // --- profiles and charters ---

    async fn get_captain_profile(&self, user_id: Uuid) -> RepoResult<Option<CaptainProfile>>;

    async fn insert_captain_profile(&self, profile: CaptainProfile) -> RepoResult<CaptainProfile>;

    async fn get_charter(&self, id: Uuid) -> RepoResult<Option<Charter>>;

    /// Insert the charter and its media and mark the draft submitted, atomically.
    ///
    /// Only a draft still in `DRAFT` status at `draft_version` is claimed;
    /// otherwise nothing is written and `NotFound` (already submitted) or
    /// `VersionConflict` is returned.
    async fn create_charter_from_draft(
        &self,
        draft_id: Uuid,
        draft_version: i32,
        charter: Charter,
        media: Vec<CharterMedia>,
    ) -> RepoResult<Charter>;
}

/// Why a draft could not be claimed for finalize.
pub fn claim_error(draft_id: Uuid, draft_version: i32, current: Option<&CharterDraft>) -> RepoError {
    match current {
        Some(draft) if draft.draft_status() == DraftStatus::Draft => RepoError::VersionConflict {
            client: draft_version,
            current: draft.version,
        },
        _ => RepoError::not_found("charter_draft", draft_id),
    }
}

/// Order used by `replace_charter_media`: `desired` first, untouched rows
/// after, deleted keys dropped, `sort_order` rewritten densely.
pub fn plan_media_order(
    existing: Vec<CharterMedia>,
    desired: Vec<CharterMedia>,
    delete_keys: &[String],
) -> Vec<CharterMedia> {
    let mut remaining: Vec<CharterMedia> = existing
        .into_iter()
        .filter(|m| !delete_keys.contains(&m.storage_key))
        .collect();
    remaining.sort_by_key(|m| m.sort_order);

    let mut planned = Vec::with_capacity(remaining.len() + desired.len());
    for mut want in desired {
        if delete_keys.contains(&want.storage_key)
            || planned
                .iter()
                .any(|p: &CharterMedia| p.storage_key == want.storage_key)
        {
            continue;
        }
        if let Some(pos) = remaining
            .iter()
            .position(|m| m.storage_key == want.storage_key)
        {
            let current = remaining.remove(pos);
            want.id = current.id;
            want.created_at = current.created_at;
            want.thumbnail_url = want.thumbnail_url.or(current.thumbnail_url);
            want.duration_seconds = want.duration_seconds.or(current.duration_seconds);
        }
        planned.push(want);
    }
    planned.extend(remaining);

    for (idx, media) in planned.iter_mut().enumerate() {
        media.sort_order = idx as i32;
    }
    planned
}
