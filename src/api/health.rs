use actix_web::{web, HttpResponse};

use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/telemetry/media").route(web::get().to(media_telemetry)));
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn media_telemetry(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.telemetry.snapshot())
}
