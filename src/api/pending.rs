use actix_web::{web, HttpResponse};
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use super::shared::ApiError;
use crate::domain::media::PendingStatusResponse;
use crate::state::AppState;

/// Upper bound on ids per poll.
const MAX_IDS: usize = 100;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/media/pending").route(web::get().to(pending_status)));
}

/// Collect `ids` from repeated `ids=` and comma-separated values; bad ids are skipped.
fn parse_ids(query: &[(String, String)]) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for (name, value) in query {
        if name != "ids" {
            continue;
        }
        for raw in value.split(',') {
            if let Ok(id) = Uuid::parse_str(raw.trim()) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    ids.truncate(MAX_IDS);
    ids
}

pub async fn pending_status(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
    query: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    let ids = parse_ids(&query);
    let records = state.repo.find_pending_media(user.0, &ids).await?;
    Ok(HttpResponse::Ok().json(PendingStatusResponse {
        items: records.iter().map(|r| r.to_status_item()).collect(),
    }))
}
