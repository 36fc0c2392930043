use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use super::shared::ApiError;
use crate::domain::charter::CharterMediaUpdate;
use crate::services::finalize::update_charter_media;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/charters/{id}/media").route(web::put().to(replace_media)));
}

pub async fn replace_media(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<CharterMediaUpdate>,
) -> Result<HttpResponse, ApiError> {
    let charter_id = path.into_inner();
    let update = body.into_inner();
    let delete_keys = update.delete_keys.clone();

    let rows = update_charter_media(state.repo.as_ref(), user.0, charter_id, update)
        .await
        .map_err(|source| ApiError::Finalize {
            source,
            request_id: Uuid::new_v4().to_string(),
        })?;

    // Rows are gone; blobs are best-effort and limited to the caller's namespaces.
    let owned_prefixes = [
        format!("captains/{}/", user.0),
        format!("charters/{}/", charter_id),
    ];
    for key in delete_keys
        .iter()
        .filter(|k| owned_prefixes.iter().any(|p| k.starts_with(p.as_str())))
    {
        if let Err(e) = state.blobs.delete(key).await {
            log::warn!("Failed to delete blob {}: {}", key, e);
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "ok": true,
        "charterId": charter_id,
        "media": rows,
    })))
}
