use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use uuid::Uuid;

use super::queue_store::QueueStore;

/// Settings for the captain-side client.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Base of the service API, e.g. `http://127.0.0.1:8080/api/v1`.
    pub api_base: String,
    pub user_id: Uuid,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    /// Directory of the durable upload queue; `None` disables persistence.
    pub queue_store_path: Option<PathBuf>,
    /// Queue entries older than this are dropped on restore.
    pub queue_max_age_secs: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8080/api/v1".to_string(),
            user_id: Uuid::nil(),
            poll_interval_ms: 3000,
            max_poll_attempts: 200,
            queue_store_path: None,
            queue_max_age_secs: 7 * 24 * 3600,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `CHARTER_CLIENT__*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Config::builder()
            .set_default("api_base", defaults.api_base)?
            .set_default("user_id", defaults.user_id.to_string())?
            .set_default("poll_interval_ms", defaults.poll_interval_ms)?
            .set_default("max_poll_attempts", defaults.max_poll_attempts)?
            .set_default("queue_max_age_secs", defaults.queue_max_age_secs)?
            .add_source(Environment::with_prefix("CHARTER_CLIENT").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn queue_store(&self) -> QueueStore {
        match &self.queue_store_path {
            Some(path) => QueueStore::new(path),
            None => QueueStore::unavailable(),
        }
    }

    pub fn queue_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.queue_max_age_secs.max(0))
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
