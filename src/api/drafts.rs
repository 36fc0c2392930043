// src/api/drafts.rs
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use super::shared::ApiError;
use crate::db::models::CharterDraft;
use crate::domain::charter::FinalizeRequest;
use crate::domain::draft::{DraftEnvelope, DraftPatchRequest, DraftStatus, FORM_VERSION};
use crate::services::finalize::{finalize_draft, FinalizeInput};
use crate::state::AppState;

/// Header carrying the draft version the client finalizes against.
pub const DRAFT_VERSION_HEADER: &str = "x-draft-version";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/drafts")
            .route("", web::post().to(create_draft))
            .route("/{id}", web::get().to(get_draft))
            .route("/{id}", web::patch().to(patch_draft))
            .route("/{id}/finalize", web::post().to(finalize)),
    );
}

async fn owned_draft(state: &AppState, user_id: Uuid, id: Uuid) -> Result<CharterDraft, ApiError> {
    state
        .repo
        .get_draft(id)
        .await?
        .filter(|d| d.user_id == user_id)
        .ok_or(ApiError::NotFound {
            entity: "charter_draft",
        })
}

pub async fn create_draft(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    body: Option<web::Json<Value>>,
) -> Result<HttpResponse, ApiError> {
    let data = body
        .map(|b| b.into_inner())
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Default::default()));
    let now = Utc::now().naive_utc();
    let draft = state
        .repo
        .insert_draft(CharterDraft {
            id: Uuid::new_v4(),
            user_id: user.0,
            status: DraftStatus::Draft.as_str().to_string(),
            version: 1,
            current_step: 0,
            form_version: FORM_VERSION,
            data,
            last_touched_at: now,
            updated_at: now,
            created_at: now,
        })
        .await?;
    log::info!("Created draft {} for user {}", draft.id, user.0);
    Ok(HttpResponse::Created().json(DraftEnvelope {
        draft: draft.to_view(),
    }))
}

pub async fn get_draft(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let draft = owned_draft(&state, user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(DraftEnvelope {
        draft: draft.to_view(),
    }))
}

pub async fn patch_draft(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<DraftPatchRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let draft = owned_draft(&state, user.0, id).await?;
    if draft.draft_status() != DraftStatus::Draft {
        return Err(ApiError::bad_request(
            "draft_not_editable",
            format!("Draft is {}", draft.status),
        ));
    }

    let DraftPatchRequest {
        data_partial,
        client_version,
        current_step,
    } = body.into_inner();
    let updated = state
        .repo
        .patch_draft(id, client_version, data_partial, current_step.max(0))
        .await?;
    log::debug!("Draft {} saved at version {}", id, updated.version);

    Ok(HttpResponse::Ok().json(DraftEnvelope {
        draft: updated.to_view(),
    }))
}

fn draft_version_header(req: &HttpRequest) -> Option<i32> {
    let raw = req.headers().get(DRAFT_VERSION_HEADER)?.to_str().ok()?;
    match raw.trim().parse() {
        Ok(version) => Some(version),
        Err(_) => {
            log::warn!("Ignoring malformed {} header '{}'", DRAFT_VERSION_HEADER, raw);
            None
        }
    }
}

pub async fn finalize(
    req: HttpRequest,
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<FinalizeRequest>,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let input = FinalizeInput {
        user_id: user.0,
        draft_id: path.into_inner(),
        draft_version: draft_version_header(&req),
        media: body.into_inner().media,
    };

    match finalize_draft(state.repo.as_ref(), &state.finalize_limiter, input).await {
        Ok(resp) => Ok(HttpResponse::Ok().json(resp)),
        Err(source) => {
            log::warn!("Finalize failed (request {}): {}", request_id, source);
            Err(ApiError::Finalize { source, request_id })
        }
    }
}
