//! Versioned draft saves with in-flight coalescing.
//!
//! At most one PATCH is in flight. A `save()` that arrives while one is
//! running marks a follow-up instead of sending; when the running PATCH
//! returns, the driving task sends exactly one more with the form as it is
//! at that moment. Every caller resolves with the outcome of the last PATCH
//! in the chain.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::form::SharedForm;
use crate::domain::draft::{DraftPatchRequest, DraftView};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DraftSaveError {
    #[error("draft version conflict (server at {current_version:?})")]
    Conflict { current_version: Option<i32> },
    #[error("draft request failed with status {status}: {code}")]
    Status { status: u16, code: String },
    #[error("draft transport error: {0}")]
    Transport(String),
    #[error("draft payload error: {0}")]
    Payload(String),
}

#[async_trait]
pub trait DraftApi: Send + Sync {
    async fn create_draft(&self) -> Result<DraftView, DraftSaveError>;
    async fn fetch_draft(&self, id: &str) -> Result<DraftView, DraftSaveError>;
    async fn patch_draft(&self, id: &str, body: &DraftPatchRequest)
        -> Result<DraftView, DraftSaveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    InFlight,
    InFlightWithFollowUp,
}

/// Server draft the manager writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftPointer {
    pub id: String,
    pub version: i32,
}

pub type SaveResult = Result<Option<DraftView>, DraftSaveError>;

struct Inner {
    state: SaveState,
    pointer: Option<DraftPointer>,
    current_step: i32,
    editing_published: bool,
    last_saved_at: Option<DateTime<Utc>>,
    chain: u64,
}

pub struct DraftSnapshotManager {
    api: Arc<dyn DraftApi>,
    form: SharedForm,
    inner: Mutex<Inner>,
    settled: watch::Sender<Option<(u64, SaveResult)>>,
}

enum Role {
    Drive(u64),
    Wait(u64, watch::Receiver<Option<(u64, SaveResult)>>),
}

impl DraftSnapshotManager {
    pub fn new(api: Arc<dyn DraftApi>, form: SharedForm) -> Self {
        let (settled, _) = watch::channel(None);
        Self {
            api,
            form,
            inner: Mutex::new(Inner {
                state: SaveState::Idle,
                pointer: None,
                current_step: 0,
                editing_published: false,
                last_saved_at: None,
                chain: 0,
            }),
            settled,
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn establish(&self, pointer: DraftPointer) {
        self.inner().pointer = Some(pointer);
    }

    /// Create a server draft and point at it.
    pub async fn create(&self) -> Result<DraftPointer, DraftSaveError> {
        let view = self.api.create_draft().await?;
        let pointer = DraftPointer {
            id: view.id,
            version: view.version,
        };
        let mut inner = self.inner();
        inner.pointer = Some(pointer.clone());
        inner.current_step = view.current_step;
        Ok(pointer)
    }

    pub fn set_current_step(&self, step: i32) {
        self.inner().current_step = step;
    }

    /// Drafts belong to the create flow; edits of a published charter skip saving.
    pub fn set_editing_published(&self, editing: bool) {
        self.inner().editing_published = editing;
    }

    pub fn state(&self) -> SaveState {
        self.inner().state
    }

    pub fn pointer(&self) -> Option<DraftPointer> {
        self.inner().pointer.clone()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.inner().last_saved_at
    }

    /// Forget the draft after a successful submit.
    pub fn clear(&self) {
        let mut inner = self.inner();
        inner.pointer = None;
        inner.current_step = 0;
        inner.last_saved_at = None;
    }

    /// Save the current form. `Ok(None)` means the save was skipped.
    pub async fn save(&self) -> SaveResult {
        let role = {
            let mut inner = self.inner();
            if inner.editing_published || inner.pointer.is_none() {
                return Ok(None);
            }
            match inner.state {
                SaveState::Idle => {
                    inner.state = SaveState::InFlight;
                    inner.chain += 1;
                    Role::Drive(inner.chain)
                }
                SaveState::InFlight | SaveState::InFlightWithFollowUp => {
                    inner.state = SaveState::InFlightWithFollowUp;
                    Role::Wait(inner.chain, self.settled.subscribe())
                }
            }
        };

        match role {
            Role::Drive(chain) => self.drive(chain).await,
            Role::Wait(chain, mut rx) => loop {
                if rx.changed().await.is_err() {
                    return Err(DraftSaveError::Transport("draft manager dropped".into()));
                }
                if let Some((settled_chain, result)) = rx.borrow_and_update().clone() {
                    if settled_chain == chain {
                        return result;
                    }
                }
            },
        }
    }

    async fn drive(&self, chain: u64) -> SaveResult {
        loop {
            let result = self.save_once().await;
            let mut inner = self.inner();
            if inner.state == SaveState::InFlightWithFollowUp {
                inner.state = SaveState::InFlight;
                log::debug!("Issuing follow-up draft save");
                continue;
            }
            inner.state = SaveState::Idle;
            self.settled.send_replace(Some((chain, result.clone())));
            return result;
        }
    }

    async fn save_once(&self) -> SaveResult {
        let Some((pointer, current_step)) = ({
            let inner = self.inner();
            inner.pointer.clone().map(|p| (p, inner.current_step))
        }) else {
            return Ok(None);
        };

        let data = {
            let form = self.form.lock().unwrap_or_else(|e| e.into_inner());
            form.to_draft_data()
        };
        let data_partial =
            serde_json::to_value(&data).map_err(|e| DraftSaveError::Payload(e.to_string()))?;
        let mut body = DraftPatchRequest {
            data_partial,
            client_version: pointer.version,
            current_step,
        };

        let view = match self.api.patch_draft(&pointer.id, &body).await {
            Ok(view) => view,
            Err(DraftSaveError::Conflict { .. }) => {
                let server = self.api.fetch_draft(&pointer.id).await?;
                log::warn!(
                    "Draft {} conflict at version {}, retrying at {}",
                    pointer.id,
                    pointer.version,
                    server.version
                );
                self.record_version(server.version, false);
                body.client_version = server.version;
                self.api.patch_draft(&pointer.id, &body).await?
            }
            Err(e) => {
                log::warn!("Draft {} save failed: {}", pointer.id, e);
                return Err(e);
            }
        };

        self.record_version(view.version, true);
        Ok(Some(view))
    }

    fn record_version(&self, version: i32, saved: bool) {
        let mut inner = self.inner();
        if let Some(pointer) = inner.pointer.as_mut() {
            pointer.version = version;
        }
        if saved {
            inner.last_saved_at = Some(Utc::now());
        }
    }
}
