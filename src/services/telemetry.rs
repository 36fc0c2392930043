//! Counters for the media registrar and transcode dispatch.
//!
//! Every increment is also logged on the `media_telemetry` target so the
//! two pipelines can be joined from logs alone.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    UploadsStored,
    LegacyMediaCreated,
    LegacyMediaFailed,
    SortOrderFailed,
    CaptainVideoCreated,
    CaptainVideoFailed,
    LegacyOnlyFallback,
    QueueDispatched,
    QueueDispatchFailed,
    TranscodeJobDispatched,
    TranscodeJobFailed,
    PendingRecordFailed,
}

impl Counter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UploadsStored => "uploads_stored",
            Self::LegacyMediaCreated => "legacy_media_created",
            Self::LegacyMediaFailed => "legacy_media_failed",
            Self::SortOrderFailed => "sort_order_failed",
            Self::CaptainVideoCreated => "captain_video_created",
            Self::CaptainVideoFailed => "captain_video_failed",
            Self::LegacyOnlyFallback => "legacy_only_fallback",
            Self::QueueDispatched => "queue_dispatched",
            Self::QueueDispatchFailed => "queue_dispatch_failed",
            Self::TranscodeJobDispatched => "transcode_job_dispatched",
            Self::TranscodeJobFailed => "transcode_job_failed",
            Self::PendingRecordFailed => "pending_record_failed",
        }
    }
}

#[derive(Debug, Default)]
pub struct MediaTelemetry {
    uploads_stored: AtomicU64,
    legacy_media_created: AtomicU64,
    legacy_media_failed: AtomicU64,
    sort_order_failed: AtomicU64,
    captain_video_created: AtomicU64,
    captain_video_failed: AtomicU64,
    legacy_only_fallback: AtomicU64,
    queue_dispatched: AtomicU64,
    queue_dispatch_failed: AtomicU64,
    transcode_job_dispatched: AtomicU64,
    transcode_job_failed: AtomicU64,
    pending_record_failed: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub uploads_stored: u64,
    pub legacy_media_created: u64,
    pub legacy_media_failed: u64,
    pub sort_order_failed: u64,
    pub captain_video_created: u64,
    pub captain_video_failed: u64,
    pub legacy_only_fallback: u64,
    pub queue_dispatched: u64,
    pub queue_dispatch_failed: u64,
    pub transcode_job_dispatched: u64,
    pub transcode_job_failed: u64,
    pub pending_record_failed: u64,
}

impl MediaTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::UploadsStored => &self.uploads_stored,
            Counter::LegacyMediaCreated => &self.legacy_media_created,
            Counter::LegacyMediaFailed => &self.legacy_media_failed,
            Counter::SortOrderFailed => &self.sort_order_failed,
            Counter::CaptainVideoCreated => &self.captain_video_created,
            Counter::CaptainVideoFailed => &self.captain_video_failed,
            Counter::LegacyOnlyFallback => &self.legacy_only_fallback,
            Counter::QueueDispatched => &self.queue_dispatched,
            Counter::QueueDispatchFailed => &self.queue_dispatch_failed,
            Counter::TranscodeJobDispatched => &self.transcode_job_dispatched,
            Counter::TranscodeJobFailed => &self.transcode_job_failed,
            Counter::PendingRecordFailed => &self.pending_record_failed,
        }
    }

    /// Increment `counter`; `context` is appended to the log line.
    pub fn incr(&self, counter: Counter, context: &str) {
        let value = self.slot(counter).fetch_add(1, Ordering::Relaxed) + 1;
        log::info!(
            target: "media_telemetry",
            "{}={} {}",
            counter.name(),
            value,
            context
        );
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.slot(counter).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            uploads_stored: self.get(Counter::UploadsStored),
            legacy_media_created: self.get(Counter::LegacyMediaCreated),
            legacy_media_failed: self.get(Counter::LegacyMediaFailed),
            sort_order_failed: self.get(Counter::SortOrderFailed),
            captain_video_created: self.get(Counter::CaptainVideoCreated),
            captain_video_failed: self.get(Counter::CaptainVideoFailed),
            legacy_only_fallback: self.get(Counter::LegacyOnlyFallback),
            queue_dispatched: self.get(Counter::QueueDispatched),
            queue_dispatch_failed: self.get(Counter::QueueDispatchFailed),
            transcode_job_dispatched: self.get(Counter::TranscodeJobDispatched),
            transcode_job_failed: self.get(Counter::TranscodeJobFailed),
            pending_record_failed: self.get(Counter::PendingRecordFailed),
        }
    }
}
