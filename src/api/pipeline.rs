//! Internal endpoints the correlator dispatches to.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::auth::InternalCaller;
use super::shared::ApiError;
use crate::db::models::PendingMedia;
use crate::domain::media::{is_video_filename, PendingKind, PendingStatus};
use crate::services::correlator::{QueueVideoRequest, TranscodeJobRequest};
use crate::services::TranscodeJob;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/media/queue").route(web::post().to(enqueue_video)))
        .service(web::resource("/transcode/jobs").route(web::post().to(submit_transcode_job)));
}

fn submit(state: &AppState, job: TranscodeJob) -> Result<(), ApiError> {
    state.jobs.try_send(job).map_err(|e| match e {
        TrySendError::Full(job) => {
            log::warn!("Transcode queue full, rejecting {:?}", job);
            ApiError::Unavailable("transcode queue is full".to_string())
        }
        TrySendError::Closed(_) => {
            log::error!("Transcode worker is not running");
            ApiError::Unavailable("transcode worker stopped".to_string())
        }
    })
}

pub async fn enqueue_video(
    _caller: InternalCaller,
    state: web::Data<AppState>,
    body: web::Json<QueueVideoRequest>,
) -> Result<HttpResponse, ApiError> {
    let video_id = body.video_id;
    state
        .repo
        .get_captain_video(video_id)
        .await?
        .ok_or(ApiError::NotFound {
            entity: "captain_video",
        })?;

    submit(&state, TranscodeJob::Video { video_id })?;
    log::info!("Queued captain video {}", video_id);
    Ok(HttpResponse::Accepted().json(json!({ "ok": true, "videoId": video_id })))
}

pub async fn submit_transcode_job(
    _caller: InternalCaller,
    state: web::Data<AppState>,
    body: web::Json<TranscodeJobRequest>,
) -> Result<HttpResponse, ApiError> {
    let job = body.into_inner();

    let existing = match job.pending_id {
        Some(id) => state.repo.get_pending_media(id).await?,
        None => None,
    };
    let pending_id = match existing {
        Some(pending) => pending.id,
        None => {
            let now = Utc::now().naive_utc();
            let kind = if is_video_filename(&job.filename) {
                PendingKind::Video
            } else {
                PendingKind::Image
            };
            let pending = PendingMedia {
                id: job.pending_id.unwrap_or_else(Uuid::new_v4),
                status: PendingStatus::Queued.as_str().to_string(),
                kind: kind.as_str().to_string(),
                original_key: job.original_key.clone(),
                original_url: job.original_url.clone(),
                final_key: None,
                final_url: None,
                thumbnail_key: None,
                thumbnail_url: None,
                size_bytes: None,
                mime_type: None,
                correlation_id: job.captain_video_id.map(|id| id.to_string()),
                error: None,
                owner_id: job.user_id,
                charter_id: Some(job.charter_id.clone()),
                duration_seconds: None,
                created_at: now,
                updated_at: now,
            };
            state.repo.insert_pending_media(pending).await?.id
        }
    };

    submit(
        &state,
        TranscodeJob::Legacy {
            pending_id,
            captain_video_id: job.captain_video_id,
        },
    )?;
    log::info!(
        "Accepted transcode job for {} (pending {}, captainVideoId {:?})",
        job.original_key,
        pending_id,
        job.captain_video_id
    );
    Ok(HttpResponse::Accepted().json(json!({ "ok": true, "pendingId": pending_id })))
}
