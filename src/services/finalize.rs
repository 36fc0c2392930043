//! Server side of draft submission and of charter media edits.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::db::models::{CaptainProfile, Charter, CharterMedia};
use crate::db::{RepoError, Repository};
use crate::domain::charter::{
    apply_order, normalize_images, validate_submission, CharterMediaUpdate, FinalizeMedia,
    FinalizeResponse, Issues, MIN_CHARTER_IMAGES,
};
use crate::domain::draft::{DraftData, DraftStatus};
use crate::domain::media::{CharterMediaKind, MediaRef};

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("draft or charter not found")]
    NotFound,
    #[error("draft version mismatch, current is {current}")]
    VersionConflict { current: i32 },
    #[error("too many submissions, retry later")]
    RateLimited,
    #[error("stored draft could not be read: {0}")]
    InvalidDraftData(String),
    #[error("no captain profile exists and none can be derived from the draft")]
    MissingCaptainProfile,
    #[error("submission failed validation")]
    Validation(Issues),
    #[error("internal error: {0}")]
    Internal(String),
}

impl FinalizeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::VersionConflict { .. } => "version_conflict",
            Self::RateLimited => "rate_limited",
            Self::InvalidDraftData(_) => "invalid_draft_data",
            Self::MissingCaptainProfile => "missing_captain_profile",
            Self::Validation(_) => "validation",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<RepoError> for FinalizeError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound { .. } => Self::NotFound,
            RepoError::VersionConflict { current, .. } => Self::VersionConflict { current },
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Sliding one-minute window per user.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<Uuid, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit as usize, Duration::from_secs(60))
    }

    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt; false when the user is over the limit.
    pub fn check(&self, user_id: Uuid) -> bool {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: Uuid, now: Instant) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let entry = hits.entry(user_id).or_default();
        while entry
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            entry.pop_front();
        }
        if entry.len() >= self.limit {
            return false;
        }
        entry.push_back(now);
        true
    }
}

pub struct FinalizeInput {
    pub user_id: Uuid,
    pub draft_id: Uuid,
    /// Value of the `x-draft-version` header, when sent.
    pub draft_version: Option<i32>,
    pub media: FinalizeMedia,
}

pub async fn finalize_draft(
    repo: &dyn Repository,
    limiter: &RateLimiter,
    input: FinalizeInput,
) -> Result<FinalizeResponse, FinalizeError> {
    let draft = repo
        .get_draft(input.draft_id)
        .await?
        .filter(|d| d.user_id == input.user_id)
        .ok_or(FinalizeError::NotFound)?;
    if draft.draft_status() != DraftStatus::Draft {
        return Err(FinalizeError::NotFound);
    }

    if let Some(version) = input.draft_version {
        if version != draft.version {
            return Err(FinalizeError::VersionConflict {
                current: draft.version,
            });
        }
    }

    if !limiter.check(input.user_id) {
        log::warn!("Finalize rate limit hit for user {}", input.user_id);
        return Err(FinalizeError::RateLimited);
    }

    let data: DraftData = serde_json::from_value(draft.data.clone())
        .map_err(|e| FinalizeError::InvalidDraftData(e.to_string()))?;

    let avatar = input.media.avatar.clone().or_else(|| data.avatar.clone());
    let profile = resolve_captain_profile(repo, input.user_id, &data, avatar.as_ref()).await?;

    validate_submission(&data, &input.media).map_err(FinalizeError::Validation)?;

    let media = &input.media;
    let images = normalize_images(
        &media.images,
        &media.images_order,
        media.images_cover_index,
    );
    let videos = apply_order(&media.videos, &media.videos_order);

    let now = Utc::now().naive_utc();
    let charter_id = Uuid::new_v4();
    let mut snapshot = data.clone();
    snapshot.uploaded_images = images.clone();
    snapshot.uploaded_videos = videos.clone();
    snapshot.images_order = None;
    snapshot.images_cover_index = None;
    snapshot.avatar = avatar;

    let charter = Charter {
        id: charter_id,
        owner_id: input.user_id,
        captain_profile_id: profile.id,
        name: data.charter.name.trim().to_string(),
        status: "PENDING".to_string(),
        data: serde_json::to_value(&snapshot)
            .map_err(|e| FinalizeError::Internal(e.to_string()))?,
        created_at: now,
        updated_at: now,
    };
    let rows = media_rows(&charter_id.to_string(), &images, &videos);

    let charter = repo
        .create_charter_from_draft(draft.id, draft.version, charter, rows)
        .await?;
    log::info!(
        "Draft {} finalized into charter {} for user {}",
        draft.id,
        charter.id,
        input.user_id
    );

    Ok(FinalizeResponse {
        ok: true,
        charter_id: charter.id.to_string(),
        captain_profile_id: profile.id.to_string(),
    })
}

async fn resolve_captain_profile(
    repo: &dyn Repository,
    user_id: Uuid,
    data: &DraftData,
    avatar: Option<&MediaRef>,
) -> Result<CaptainProfile, FinalizeError> {
    if let Some(profile) = repo.get_captain_profile(user_id).await? {
        return Ok(profile);
    }

    let display_name = data.captain.display_name.trim();
    if display_name.is_empty() {
        return Err(FinalizeError::MissingCaptainProfile);
    }
    let non_empty = |s: &str| (!s.trim().is_empty()).then(|| s.trim().to_string());

    let profile = CaptainProfile {
        id: Uuid::new_v4(),
        user_id,
        display_name: display_name.to_string(),
        phone: non_empty(&data.captain.phone),
        bio: non_empty(&data.captain.bio),
        experience_years: data.captain.experience_years.map(|y| y as i32),
        avatar_url: avatar.map(|a| a.url.clone()),
        created_at: Utc::now().naive_utc(),
    };
    repo.insert_captain_profile(profile).await.map_err(|e| {
        log::error!("Failed to create captain profile for {}: {}", user_id, e);
        FinalizeError::MissingCaptainProfile
    })
}

/// Photos first, then videos, numbered densely.
fn media_rows(charter_id: &str, images: &[MediaRef], videos: &[MediaRef]) -> Vec<CharterMedia> {
    let now = Utc::now().naive_utc();
    images
        .iter()
        .map(|m| (CharterMediaKind::CharterPhoto, m))
        .chain(videos.iter().map(|m| (CharterMediaKind::CharterVideo, m)))
        .enumerate()
        .map(|(idx, (kind, m))| CharterMedia {
            id: Uuid::new_v4(),
            charter_id: charter_id.to_string(),
            kind: kind.as_str().to_string(),
            url: m.url.clone(),
            storage_key: m.name.clone(),
            sort_order: idx as i32,
            thumbnail_url: None,
            duration_seconds: None,
            created_at: now,
        })
        .collect()
}

/// Replace the media of a published charter (edit mode).
pub async fn update_charter_media(
    repo: &dyn Repository,
    user_id: Uuid,
    charter_id: Uuid,
    update: CharterMediaUpdate,
) -> Result<Vec<CharterMedia>, FinalizeError> {
    repo.get_charter(charter_id)
        .await?
        .filter(|c| c.owner_id == user_id)
        .ok_or(FinalizeError::NotFound)?;

    if update.media.images.len() < MIN_CHARTER_IMAGES {
        let mut issues = Issues::new();
        issues.insert(
            "images".into(),
            vec![format!("At least {MIN_CHARTER_IMAGES} photos are required")],
        );
        return Err(FinalizeError::Validation(issues));
    }

    let id = charter_id.to_string();
    let desired = media_rows(&id, &update.media.images, &update.media.videos);
    let rows = repo
        .replace_charter_media(&id, desired, &update.delete_keys)
        .await?;
    log::info!("Charter {} media replaced ({} rows)", charter_id, rows.len());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CharterDraft;
    use crate::db::MemoryRepository;
    use crate::domain::draft::{TripDraft, FORM_VERSION};

    fn complete_data() -> DraftData {
        let mut data = DraftData::default();
        data.captain.display_name = "Cap'n Joe".into();
        data.charter.name = "Reel Deal".into();
        data.amenities = vec!["Live bait".into()];
        data.trips = vec![TripDraft {
            name: "Half day".into(),
            ..TripDraft::default()
        }];
        data
    }

    fn images(n: usize) -> Vec<MediaRef> {
        (0..n)
            .map(|i| {
                MediaRef::new(
                    format!("captains/u/media/{i}.jpg"),
                    format!("http://localhost/media/captains/u/media/{i}.jpg"),
                )
            })
            .collect()
    }

    async fn seed_draft(repo: &MemoryRepository, user_id: Uuid, data: &DraftData) -> CharterDraft {
        let now = Utc::now().naive_utc();
        repo.insert_draft(CharterDraft {
            id: Uuid::new_v4(),
            user_id,
            status: DraftStatus::Draft.as_str().into(),
            version: 3,
            current_step: 4,
            form_version: FORM_VERSION,
            data: serde_json::to_value(data).unwrap(),
            last_touched_at: now,
            updated_at: now,
            created_at: now,
        })
        .await
        .unwrap()
    }

    fn input(user_id: Uuid, draft_id: Uuid, media: FinalizeMedia) -> FinalizeInput {
        FinalizeInput {
            user_id,
            draft_id,
            draft_version: Some(3),
            media,
        }
    }

    #[tokio::test]
    async fn creates_charter_with_cover_first_and_dense_order() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let draft = seed_draft(&repo, user, &complete_data()).await;
        let limiter = RateLimiter::per_minute(5);

        let media = FinalizeMedia {
            images: images(3),
            images_order: vec![2, 1, 0],
            images_cover_index: Some(1),
            ..FinalizeMedia::default()
        };
        let resp = finalize_draft(&repo, &limiter, input(user, draft.id, media))
            .await
            .unwrap();

        let rows = repo.list_charter_media(&resp.charter_id).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.storage_key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["captains/u/media/1.jpg", "captains/u/media/2.jpg", "captains/u/media/0.jpg"]
        );
        assert_eq!(rows.iter().map(|r| r.sort_order).collect::<Vec<_>>(), vec![0, 1, 2]);

        let stored = repo.get_draft(draft.id).await.unwrap().unwrap();
        assert_eq!(stored.draft_status(), DraftStatus::Submitted);
    }

    fn charter_for(user_id: Uuid) -> Charter {
        let now = Utc::now().naive_utc();
        Charter {
            id: Uuid::new_v4(),
            owner_id: user_id,
            captain_profile_id: Uuid::new_v4(),
            name: "Reel Deal".into(),
            status: "PENDING".into(),
            data: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn a_draft_is_claimed_by_one_finalize_only() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let draft = seed_draft(&repo, user, &complete_data()).await;

        // Both callers read version 3 before either wrote.
        repo.create_charter_from_draft(draft.id, 3, charter_for(user), Vec::new())
            .await
            .unwrap();
        let err = repo
            .create_charter_from_draft(draft.id, 3, charter_for(user), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound { .. }));
        assert_eq!(repo.charter_count(), 1);

        let other = seed_draft(&repo, user, &complete_data()).await;
        let err = repo
            .create_charter_from_draft(other.id, 2, charter_for(user), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::VersionConflict { client: 2, current: 3 }));
        assert_eq!(repo.charter_count(), 1);
    }

    #[tokio::test]
    async fn stale_version_header_conflicts() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let draft = seed_draft(&repo, user, &complete_data()).await;
        let mut req = input(user, draft.id, FinalizeMedia::default());
        req.draft_version = Some(2);

        let err = finalize_draft(&repo, &RateLimiter::per_minute(5), req)
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::VersionConflict { current: 3 }));
    }

    #[tokio::test]
    async fn foreign_draft_is_not_found() {
        let repo = MemoryRepository::new();
        let draft = seed_draft(&repo, Uuid::new_v4(), &complete_data()).await;
        let err = finalize_draft(
            &repo,
            &RateLimiter::per_minute(5),
            input(Uuid::new_v4(), draft.id, FinalizeMedia::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn too_few_images_reports_validation_issue() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let draft = seed_draft(&repo, user, &complete_data()).await;
        let media = FinalizeMedia {
            images: images(2),
            ..FinalizeMedia::default()
        };
        let err = finalize_draft(&repo, &RateLimiter::per_minute(5), input(user, draft.id, media))
            .await
            .unwrap_err();
        match err {
            FinalizeError::Validation(issues) => assert!(issues.contains_key("images")),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(repo.charter_count(), 0);
    }

    #[tokio::test]
    async fn missing_profile_without_display_name() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let mut data = complete_data();
        data.captain.display_name.clear();
        let draft = seed_draft(&repo, user, &data).await;
        let media = FinalizeMedia {
            images: images(3),
            ..FinalizeMedia::default()
        };
        let err = finalize_draft(&repo, &RateLimiter::per_minute(5), input(user, draft.id, media))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "missing_captain_profile");
    }

    #[test]
    fn limiter_blocks_after_limit_and_recovers() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let user = Uuid::new_v4();
        let start = Instant::now();
        assert!(limiter.check_at(user, start));
        assert!(limiter.check_at(user, start));
        assert!(!limiter.check_at(user, start + Duration::from_secs(1)));
        assert!(limiter.check_at(Uuid::new_v4(), start));
        assert!(limiter.check_at(user, start + Duration::from_secs(61)));
    }
}
