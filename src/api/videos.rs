use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::auth::AuthenticatedUser;
use super::shared::ApiError;
use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/videos").route("", web::get().to(list_videos)));
}

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_videos(
    user: AuthenticatedUser,
    query: web::Query<ListQueryParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100); // Maximum 100 items per page
    let offset = (page - 1) * per_page;

    let (videos, total_count) = state
        .repo
        .list_captain_videos(user.0, offset, per_page)
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "videos": videos,
        "meta": {
            "total": total_count,
            "page": page,
            "per_page": per_page,
            "total_pages": (total_count as f64 / per_page as f64).ceil() as i64,
        }
    })))
}
