//! Charter media pipeline and onboarding draft core.
//!
//! The service half (`api`, `services`, `db`, `storage`) accepts uploads,
//! registers videos with both transcode pipelines and stores versioned
//! drafts. The `client` half drives the same flows from the captain's side.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod domain;
pub mod services;
pub mod state;
pub mod storage;

use actix_files::Files;
use actix_web::web;

pub use state::AppState;

/// Largest accepted JSON body (draft snapshots, finalize payloads).
const JSON_LIMIT_BYTES: usize = 4 * 1024 * 1024;

/// Routes, static media and shared state for one `App`.
pub fn configure_app(state: web::Data<AppState>) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |cfg: &mut web::ServiceConfig| {
        let media_root = state.blobs.root().to_path_buf();
        cfg.app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(JSON_LIMIT_BYTES))
            .configure(api::configure)
            .service(Files::new("/media", media_root));
    }
}
