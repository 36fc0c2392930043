use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde_json::Value;
use uuid::Uuid;

use super::models::{
    CaptainProfile, CaptainVideo, CaptainVideoUpdate, Charter, CharterDraft, CharterMedia,
    PendingMedia, PendingMediaUpdate,
};
use super::repository::{claim_error, plan_media_order, RepoError, RepoResult, Repository};
use super::schema::{
    captain_profiles, captain_videos, charter_drafts, charter_media, charters, pending_media,
};
use super::DbPool;
use crate::domain::draft::{merge_partial, DraftStatus};

pub struct PgRepository {
    pool: DbPool,
}

type PooledConn = deadpool::managed::Object<
    diesel_async::pooled_connection::AsyncDieselConnectionManager<AsyncPgConnection>,
>;

impl PgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> RepoResult<PooledConn> {
        self.pool.get().await.map_err(|e| {
            log::error!("Failed to get DB connection: {}", e);
            RepoError::Pool(e.to_string())
        })
    }
}

fn not_found_as(entity: &'static str, id: Uuid) -> impl FnOnce(diesel::result::Error) -> RepoError {
    move |e| match e {
        diesel::result::Error::NotFound => RepoError::not_found(entity, id),
        other => RepoError::from(other),
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn next_sort_order(&self, charter_id: &str) -> RepoResult<i32> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let current: Option<i32> = charter_media::table
            .filter(charter_media::charter_id.eq(charter_id))
            .select(max(charter_media::sort_order))
            .first(conn)
            .await?;
        Ok(current.map(|m| m + 1).unwrap_or(0))
    }

    async fn insert_charter_media(&self, media: CharterMedia) -> RepoResult<CharterMedia> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        diesel::insert_into(charter_media::table)
            .values(&media)
            .execute(conn)
            .await?;
        Ok(media)
    }

    async fn list_charter_media(&self, charter_id: &str) -> RepoResult<Vec<CharterMedia>> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let rows = charter_media::table
            .filter(charter_media::charter_id.eq(charter_id))
            .order(charter_media::sort_order.asc())
            .load::<CharterMedia>(conn)
            .await?;
        Ok(rows)
    }

    async fn replace_charter_media(
        &self,
        charter_id: &str,
        desired: Vec<CharterMedia>,
        delete_keys: &[String],
    ) -> RepoResult<Vec<CharterMedia>> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let charter_id = charter_id.to_string();
        let delete_keys = delete_keys.to_vec();

        conn.transaction::<_, RepoError, _>(|conn| {
            async move {
                let existing = charter_media::table
                    .filter(charter_media::charter_id.eq(&charter_id))
                    .for_update()
                    .load::<CharterMedia>(conn)
                    .await?;
                let planned = plan_media_order(existing, desired, &delete_keys);

                diesel::delete(charter_media::table.filter(charter_media::charter_id.eq(&charter_id)))
                    .execute(conn)
                    .await?;
                if !planned.is_empty() {
                    diesel::insert_into(charter_media::table)
                        .values(&planned)
                        .execute(conn)
                        .await?;
                }
                Ok(planned)
            }
            .scope_boxed()
        })
        .await
    }

    async fn mark_charter_media_processed(
        &self,
        storage_key: &str,
        url: &str,
        thumbnail_url: Option<&str>,
        duration_seconds: Option<f64>,
    ) -> RepoResult<usize> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let touched = diesel::update(
            charter_media::table.filter(charter_media::storage_key.eq(storage_key)),
        )
        .set((
            charter_media::url.eq(url),
            charter_media::thumbnail_url.eq(thumbnail_url),
            charter_media::duration_seconds.eq(duration_seconds),
        ))
        .execute(conn)
        .await?;
        Ok(touched)
    }

    async fn insert_captain_video(&self, video: CaptainVideo) -> RepoResult<CaptainVideo> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        diesel::insert_into(captain_videos::table)
            .values(&video)
            .execute(conn)
            .await?;
        Ok(video)
    }

    async fn get_captain_video(&self, id: Uuid) -> RepoResult<Option<CaptainVideo>> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let video = captain_videos::table
            .find(id)
            .first::<CaptainVideo>(conn)
            .await
            .optional()?;
        Ok(video)
    }

    async fn update_captain_video(
        &self,
        id: Uuid,
        mut update: CaptainVideoUpdate,
    ) -> RepoResult<CaptainVideo> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        update.updated_at.get_or_insert_with(|| Utc::now().naive_utc());
        diesel::update(captain_videos::table.find(id))
            .set(&update)
            .get_result::<CaptainVideo>(conn)
            .await
            .map_err(not_found_as("captain_video", id))
    }

    async fn list_captain_videos(
        &self,
        owner_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> RepoResult<(Vec<CaptainVideo>, i64)> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let videos = captain_videos::table
            .filter(captain_videos::owner_id.eq(owner_id))
            .order_by(captain_videos::created_at.desc())
            .offset(offset)
            .limit(limit)
            .load::<CaptainVideo>(conn)
            .await?;
        let total: i64 = captain_videos::table
            .filter(captain_videos::owner_id.eq(owner_id))
            .count()
            .get_result(conn)
            .await?;
        Ok((videos, total))
    }

    async fn insert_pending_media(&self, pending: PendingMedia) -> RepoResult<PendingMedia> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        diesel::insert_into(pending_media::table)
            .values(&pending)
            .execute(conn)
            .await?;
        Ok(pending)
    }

    async fn get_pending_media(&self, id: Uuid) -> RepoResult<Option<PendingMedia>> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let pending = pending_media::table
            .find(id)
            .first::<PendingMedia>(conn)
            .await
            .optional()?;
        Ok(pending)
    }

    async fn find_pending_media(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> RepoResult<Vec<PendingMedia>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let rows = pending_media::table
            .filter(pending_media::id.eq_any(ids.to_vec()))
            .filter(pending_media::owner_id.eq(owner_id))
            .load::<PendingMedia>(conn)
            .await?;
        Ok(rows)
    }

    async fn update_pending_media(
        &self,
        id: Uuid,
        mut update: PendingMediaUpdate,
    ) -> RepoResult<PendingMedia> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        update.updated_at.get_or_insert_with(|| Utc::now().naive_utc());
        diesel::update(pending_media::table.find(id))
            .set(&update)
            .get_result::<PendingMedia>(conn)
            .await
            .map_err(not_found_as("pending_media", id))
    }

    async fn insert_draft(&self, draft: CharterDraft) -> RepoResult<CharterDraft> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        diesel::insert_into(charter_drafts::table)
            .values(&draft)
            .execute(conn)
            .await?;
        Ok(draft)
    }

    async fn get_draft(&self, id: Uuid) -> RepoResult<Option<CharterDraft>> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let draft = charter_drafts::table
            .find(id)
            .first::<CharterDraft>(conn)
            .await
            .optional()?;
        Ok(draft)
    }

    async fn patch_draft(
        &self,
        id: Uuid,
        client_version: i32,
        data_partial: Value,
        current_step: i32,
    ) -> RepoResult<CharterDraft> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;

        conn.transaction::<_, RepoError, _>(|conn| {
            async move {
                let stored = charter_drafts::table
                    .find(id)
                    .for_update()
                    .first::<CharterDraft>(conn)
                    .await
                    .optional()?
                    .ok_or_else(|| RepoError::not_found("charter_draft", id))?;

                if stored.version != client_version {
                    return Err(RepoError::VersionConflict {
                        client: client_version,
                        current: stored.version,
                    });
                }

                let mut data = stored.data;
                merge_partial(&mut data, data_partial);
                let now = Utc::now().naive_utc();

                let updated = diesel::update(charter_drafts::table.find(id))
                    .set((
                        charter_drafts::data.eq(data),
                        charter_drafts::version.eq(stored.version + 1),
                        charter_drafts::current_step.eq(current_step),
                        charter_drafts::last_touched_at.eq(now),
                        charter_drafts::updated_at.eq(now),
                    ))
                    .get_result::<CharterDraft>(conn)
                    .await?;
                Ok(updated)
            }
            .scope_boxed()
        })
        .await
    }

    async fn get_captain_profile(&self, user_id: Uuid) -> RepoResult<Option<CaptainProfile>> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let profile = captain_profiles::table
            .filter(captain_profiles::user_id.eq(user_id))
            .first::<CaptainProfile>(conn)
            .await
            .optional()?;
        Ok(profile)
    }

    async fn insert_captain_profile(&self, profile: CaptainProfile) -> RepoResult<CaptainProfile> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        diesel::insert_into(captain_profiles::table)
            .values(&profile)
            .execute(conn)
            .await?;
        Ok(profile)
    }

    async fn get_charter(&self, id: Uuid) -> RepoResult<Option<Charter>> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;
        let charter = charters::table
            .find(id)
            .first::<Charter>(conn)
            .await
            .optional()?;
        Ok(charter)
    }

    async fn create_charter_from_draft(
        &self,
        draft_id: Uuid,
        draft_version: i32,
        charter: Charter,
        media: Vec<CharterMedia>,
    ) -> RepoResult<Charter> {
        let mut obj = self.conn().await?;
        let conn = &mut *obj;

        conn.transaction::<_, RepoError, _>(|conn| {
            async move {
                // Claim the draft first; a concurrent finalize blocks on the
                // row lock and then matches nothing.
                let touched = diesel::update(
                    charter_drafts::table
                        .find(draft_id)
                        .filter(charter_drafts::status.eq(DraftStatus::Draft.as_str()))
                        .filter(charter_drafts::version.eq(draft_version)),
                )
                .set((
                    charter_drafts::status.eq(DraftStatus::Submitted.as_str()),
                    charter_drafts::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)
                .await?;
                if touched == 0 {
                    let current = charter_drafts::table
                        .find(draft_id)
                        .first::<CharterDraft>(conn)
                        .await
                        .optional()?;
                    return Err(claim_error(draft_id, draft_version, current.as_ref()));
                }

                diesel::insert_into(charters::table)
                    .values(&charter)
                    .execute(conn)
                    .await?;
                if !media.is_empty() {
                    diesel::insert_into(charter_media::table)
                        .values(&media)
                        .execute(conn)
                        .await?;
                }
                Ok(charter)
            }
            .scope_boxed()
        })
        .await
    }
}
