// src/api/mod.rs
pub mod auth;
pub mod charters;
pub mod drafts;
pub mod health;
pub mod pending;
pub mod pipeline;
pub mod shared;
pub mod uploads;
pub mod videos;

use actix_web::web;

pub use shared::ApiError;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(uploads::configure)
            .configure(pipeline::configure)
            .configure(pending::configure)
            .configure(drafts::configure)
            .configure(charters::configure)
            .configure(videos::configure)
            .configure(health::configure),
    );
}
