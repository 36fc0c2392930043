use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub ffmpeg: FfmpegConfig,
    pub finalize: FinalizeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Empty selects the in-memory repository.
    pub url: String,
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub upload_path: String,
    /// Prefix prepended to storage keys to build public URLs.
    pub public_base_url: String,
    pub max_file_size: usize, // in bytes
    pub short_video_max_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    pub queue_url: String,
    pub transcode_job_url: String,
    /// Shared secret for the internal pipeline endpoints.
    pub internal_token: String,
    /// Accept internal calls without a token while `internal_token` is empty.
    /// Only meant for local development.
    pub allow_open_internal: bool,
    pub dispatch_timeout_secs: u64,
    pub worker_queue_depth: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FfmpegConfig {
    pub thread_count: usize,
    pub preset: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FinalizeConfig {
    pub rate_limit_per_minute: u32,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 5)?
            .set_default("storage.upload_path", "uploads")?
            .set_default("storage.public_base_url", "http://127.0.0.1:8080/media")?
            .set_default("storage.max_file_size", 1024 * 1024 * 1024)? // 1GB
            .set_default("storage.short_video_max_bytes", 50 * 1024 * 1024)? // 50MB
            .set_default("pipeline.queue_url", "http://127.0.0.1:8080/api/v1/media/queue")?
            .set_default(
                "pipeline.transcode_job_url",
                "http://127.0.0.1:8080/api/v1/transcode/jobs",
            )?
            .set_default("pipeline.internal_token", "")?
            .set_default("pipeline.allow_open_internal", false)?
            .set_default("pipeline.dispatch_timeout_secs", 10)?
            .set_default("pipeline.worker_queue_depth", 256)?
            .set_default("ffmpeg.thread_count", 2)?
            .set_default("ffmpeg.preset", "fast")?
            .set_default("finalize.rate_limit_per_minute", 10)?
            // Layer on the environment-specific values
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in settings from the environment
            // E.g. `APP__SERVER__PORT=5001 ./target/charter-media` would set `server.port`
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        // Deserialize the configuration
        s.try_deserialize()
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database.url.trim().is_empty()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_path: "uploads".to_string(),
            public_base_url: "http://127.0.0.1:8080/media".to_string(),
            max_file_size: 1024 * 1024 * 1024,      // 1GB
            short_video_max_bytes: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_url: "http://127.0.0.1:8080/api/v1/media/queue".to_string(),
            transcode_job_url: "http://127.0.0.1:8080/api/v1/transcode/jobs".to_string(),
            internal_token: String::new(),
            allow_open_internal: false,
            dispatch_timeout_secs: 10,
            worker_queue_depth: 256,
        }
    }
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            thread_count: 2,
            preset: "fast".to_string(),
        }
    }
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 10,
        }
    }
}
