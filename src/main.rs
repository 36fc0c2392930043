use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::sync::mpsc;

use charter_media::config::AppConfig;
use charter_media::db::{self, MemoryRepository, PgRepository, Repository};
use charter_media::services::finalize::RateLimiter;
use charter_media::services::video_processor::spawn_worker;
use charter_media::services::{FfmpegTranscoder, HttpJobDispatcher, MediaTelemetry, VideoProcessor};
use charter_media::storage::LocalBlobStore;
use charter_media::{configure_app, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    // Load configuration
    let config = Arc::new(AppConfig::new()?);

    log::info!(
        "Starting server on {}:{}",
        config.server.host,
        config.server.port
    );

    if config.pipeline.internal_token.is_empty() {
        if config.pipeline.allow_open_internal {
            log::warn!("Internal pipeline endpoints accept unauthenticated calls");
        } else {
            log::warn!(
                "No pipeline.internal_token set; internal pipeline endpoints will reject every call"
            );
        }
    }

    // Create upload directory if it doesn't exist
    tokio::fs::create_dir_all(&config.storage.upload_path).await?;

    let repo: Arc<dyn Repository> = if config.uses_memory_store() {
        log::warn!("No database url configured, using the in-memory repository");
        Arc::new(MemoryRepository::new())
    } else {
        let pool = db::create_pool(&config.database.url, config.database.max_connections)?;
        Arc::new(PgRepository::new(pool))
    };

    let blobs = LocalBlobStore::new(
        &config.storage.upload_path,
        config.storage.public_base_url.clone(),
    );

    let (jobs, job_rx) = mpsc::channel(config.pipeline.worker_queue_depth.max(1));
    let processor = VideoProcessor::new(
        repo.clone(),
        blobs.clone(),
        Arc::new(FfmpegTranscoder::new(config.ffmpeg.clone())),
    );
    let worker = spawn_worker(Arc::new(processor), job_rx);

    let state = web::Data::new(AppState {
        config: config.clone(),
        repo,
        blobs,
        dispatcher: Arc::new(HttpJobDispatcher::new(&config.pipeline)?),
        telemetry: Arc::new(MediaTelemetry::new()),
        jobs,
        finalize_limiter: Arc::new(RateLimiter::per_minute(config.finalize.rate_limit_per_minute)),
    });

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .wrap(actix_cors::Cors::permissive()) // Configure properly in production
            .configure(configure_app(state.clone()))
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run()
    .await?;

    worker.abort();
    Ok(())
}
