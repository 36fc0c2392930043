//! Durable store for the upload queue.
//!
//! Each item is two files under the store root: `<id>.bin` with the raw
//! bytes and `<id>.json` with the metadata. Both are written to a `.tmp`
//! sibling and renamed into place; the metadata goes last, so an item is
//! only visible once its bytes are complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::form::{FileId, LocalFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Error,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimInfo {
    pub start_sec: f64,
    pub end_sec: f64,
    pub did_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub id: String,
    pub file: LocalFile,
    pub status: QueueStatus,
    pub progress: u8,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub trim: Option<TrimInfo>,
}

impl QueueItem {
    pub fn new(file: LocalFile) -> Self {
        Self {
            id: file.id.as_str().to_string(),
            size_bytes: file.size(),
            file,
            status: QueueStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            canceled_at: None,
            error: None,
            trim: None,
        }
    }
}

/// On-disk metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMeta {
    id: String,
    status: QueueStatus,
    progress: u8,
    size_bytes: u64,
    created_at: DateTime<Utc>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    canceled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    trim: Option<TrimInfo>,
    file_name: String,
    file_type: String,
    last_modified: i64,
}

impl StoredMeta {
    fn from_item(item: &QueueItem) -> Self {
        Self {
            id: item.id.clone(),
            status: item.status,
            progress: item.progress,
            size_bytes: item.size_bytes,
            created_at: item.created_at,
            started_at: item.started_at,
            canceled_at: item.canceled_at,
            error: item.error.clone(),
            trim: item.trim.clone(),
            file_name: item.file.name.clone(),
            file_type: item.file.mime_type.clone(),
            last_modified: item.file.last_modified,
        }
    }

    fn into_item(self, bytes: Vec<u8>) -> QueueItem {
        let file = LocalFile {
            id: FileId(self.id.clone()),
            name: self.file_name,
            mime_type: self.file_type,
            last_modified: self.last_modified,
            bytes: Arc::new(bytes),
        };
        QueueItem {
            id: self.id,
            file,
            status: self.status,
            progress: self.progress,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            started_at: self.started_at,
            canceled_at: self.canceled_at,
            error: self.error,
            trim: self.trim,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueStoreError {
    #[error("failed to open queue store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to store queue item {id}: {source}")]
    Put {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read queue item {id}: {reason}")]
    Get { id: String, reason: String },
    #[error("failed to delete queue item {id}: {source}")]
    Delete {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to clear queue store: {source}")]
    Clear {
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct QueueStore {
    root: Option<PathBuf>,
}

fn io_put(id: &str) -> impl FnOnce(std::io::Error) -> QueueStoreError + '_ {
    move |source| QueueStoreError::Put {
        id: id.to_string(),
        source,
    }
}

/// Ids double as file names.
fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl QueueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// A store without persistent storage: every call succeeds and holds nothing.
    pub fn unavailable() -> Self {
        Self { root: None }
    }

    pub fn is_available(&self) -> bool {
        self.root.is_some()
    }

    fn paths(&self, root: &Path, id: &str) -> (PathBuf, PathBuf) {
        (root.join(format!("{id}.json")), root.join(format!("{id}.bin")))
    }

    pub async fn init(&self) -> Result<(), QueueStoreError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        fs::create_dir_all(root)
            .await
            .map_err(|source| QueueStoreError::Open {
                path: root.clone(),
                source,
            })
    }

    /// Persist metadata and bytes, replacing any item with the same id.
    pub async fn store_item(&self, item: &QueueItem) -> Result<(), QueueStoreError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        if !valid_id(&item.id) {
            return Err(QueueStoreError::Put {
                id: item.id.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid item id"),
            });
        }
        self.init().await?;

        let (meta_path, bin_path) = self.paths(root, &item.id);
        let meta = serde_json::to_vec(&StoredMeta::from_item(item))
            .map_err(|e| io_put(&item.id)(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        write_atomic(&bin_path, &item.file.bytes)
            .await
            .map_err(io_put(&item.id))?;
        write_atomic(&meta_path, &meta)
            .await
            .map_err(io_put(&item.id))?;
        Ok(())
    }

    async fn read_metas(&self, root: &Path) -> Result<Vec<StoredMeta>, QueueStoreError> {
        let mut metas = Vec::new();
        let mut dir = match fs::read_dir(root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(metas),
            Err(source) => {
                return Err(QueueStoreError::Open {
                    path: root.to_path_buf(),
                    source,
                })
            }
        };

        loop {
            let entry = dir.next_entry().await.map_err(|e| QueueStoreError::Get {
                id: root.display().to_string(),
                reason: e.to_string(),
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read(&path).await.map_err(|e| QueueStoreError::Get {
                id: path.display().to_string(),
                reason: e.to_string(),
            })?;
            match serde_json::from_slice::<StoredMeta>(&raw) {
                Ok(meta) => metas.push(meta),
                Err(e) => log::warn!("Skipping unreadable queue entry {}: {}", path.display(), e),
            }
        }

        metas.sort_by_key(|m| m.created_at);
        Ok(metas)
    }

    /// Every stored item with its bytes, oldest first.
    pub async fn get_stored_items(&self) -> Result<Vec<QueueItem>, QueueStoreError> {
        let Some(root) = &self.root else {
            return Ok(Vec::new());
        };
        let mut items = Vec::new();
        for meta in self.read_metas(root).await? {
            let (_, bin_path) = self.paths(root, &meta.id);
            match fs::read(&bin_path).await {
                Ok(bytes) => items.push(meta.into_item(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::warn!("Queue item {} has no stored bytes, skipping", meta.id);
                }
                Err(e) => {
                    return Err(QueueStoreError::Get {
                        id: meta.id,
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(items)
    }

    pub async fn remove_item(&self, id: &str) -> Result<(), QueueStoreError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        if !valid_id(id) {
            return Ok(());
        }
        let (meta_path, bin_path) = self.paths(root, id);
        let delete_err = |source| QueueStoreError::Delete {
            id: id.to_string(),
            source,
        };
        remove_if_present(&meta_path).await.map_err(delete_err)?;
        remove_if_present(&bin_path).await.map_err(delete_err)?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), QueueStoreError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        match fs::remove_dir_all(root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(QueueStoreError::Clear { source }),
        }
        fs::create_dir_all(root)
            .await
            .map_err(|source| QueueStoreError::Clear { source })
    }

    /// Delete items created before `now - max_age`. Returns how many went.
    pub async fn clear_old_items(&self, max_age: Duration) -> Result<usize, QueueStoreError> {
        let Some(root) = &self.root else {
            return Ok(0);
        };
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;
        for meta in self.read_metas(root).await? {
            if meta.created_at >= cutoff {
                break;
            }
            self.remove_item(&meta.id).await?;
            removed += 1;
        }
        if removed > 0 {
            log::info!("Dropped {} stale upload queue items", removed);
        }
        Ok(removed)
    }
}
