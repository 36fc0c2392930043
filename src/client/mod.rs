//! Captain-side client: durable upload queue, uploader, pending-media
//! poller, draft snapshots, step wizard and submit flow.

pub mod api;
pub mod config;
pub mod draft;
pub mod finalize;
pub mod form;
pub mod poller;
pub mod queue_store;
pub mod steps;
pub mod upload_queue;
pub mod uploader;
pub mod wizard;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use draft::DraftSnapshotManager;
pub use finalize::FinalizeOrchestrator;
pub use poller::PendingMediaPoller;
pub use upload_queue::UploadQueue;
pub use wizard::StepWizard;
