//! Polls the pending-status endpoint until tracked uploads settle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::media::{PendingStatus, PendingStatusItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    Queued,
    Processing,
    Ready,
    Failed,
}

impl PreviewState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

/// What the form shows for one uploaded video while it is processed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPreview {
    pub id: String,
    pub state: PreviewState,
    pub original_url: Option<String>,
    pub final_url: Option<String>,
    pub final_key: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
}

impl PendingPreview {
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: PreviewState::Queued,
            original_url: None,
            final_url: None,
            final_key: None,
            thumbnail_url: None,
            duration_seconds: None,
            error: None,
        }
    }
}

/// Merge one server status into a preview.
///
/// READY without a final URL keeps the previous state: the worker may have
/// written the status before the URL.
pub fn reconcile(preview: &mut PendingPreview, item: &PendingStatusItem) {
    if item.original_url.is_some() {
        preview.original_url = item.original_url.clone();
    }
    match item.status {
        PendingStatus::Failed => {
            preview.state = PreviewState::Failed;
            preview.error = Some(
                item.error
                    .clone()
                    .unwrap_or_else(|| "Processing failed".to_string()),
            );
        }
        PendingStatus::Transcoding => {
            if preview.state == PreviewState::Queued {
                preview.state = PreviewState::Processing;
            }
        }
        PendingStatus::Ready => {
            if let Some(url) = &item.final_url {
                preview.state = PreviewState::Ready;
                preview.final_url = Some(url.clone());
                preview.final_key = item.final_key.clone();
                preview.thumbnail_url = item.thumbnail_url.clone();
                preview.duration_seconds = item.duration_seconds;
                preview.error = None;
            }
        }
        PendingStatus::Queued => {}
    }
}

#[async_trait]
pub trait PendingStatusSource: Send + Sync {
    async fn fetch_status(&self, ids: &[String]) -> anyhow::Result<Vec<PendingStatusItem>>;
}

#[derive(Default)]
struct PollerInner {
    previews: BTreeMap<String, PendingPreview>,
    running: bool,
    attempts: u32,
}

#[derive(Clone)]
pub struct PendingMediaPoller {
    source: Arc<dyn PendingStatusSource>,
    interval: Duration,
    max_attempts: u32,
    inner: Arc<Mutex<PollerInner>>,
}

impl PendingMediaPoller {
    pub fn new(source: Arc<dyn PendingStatusSource>, interval: Duration, max_attempts: u32) -> Self {
        Self {
            source,
            interval,
            max_attempts,
            inner: Arc::new(Mutex::new(PollerInner::default())),
        }
    }

    fn inner(&self) -> MutexGuard<'_, PollerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start tracking a preview; spawns the poll loop if it is not running.
    /// Must be called inside a tokio runtime.
    pub fn track(&self, preview: PendingPreview) {
        let start = {
            let mut inner = self.inner();
            inner.previews.insert(preview.id.clone(), preview);
            inner.attempts = 0;
            if inner.running {
                false
            } else {
                inner.running = true;
                true
            }
        };
        if start {
            let poller = self.clone();
            tokio::spawn(async move { poller.run().await });
        }
    }

    pub fn untrack(&self, id: &str) -> Option<PendingPreview> {
        self.inner().previews.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<PendingPreview> {
        self.inner().previews.get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<PendingPreview> {
        self.inner().previews.values().cloned().collect()
    }

    pub fn is_running(&self) -> bool {
        self.inner().running
    }

    /// Ids still worth asking about, or `None` when the loop should stop.
    fn next_batch(&self) -> Option<Vec<String>> {
        let mut inner = self.inner();
        let outstanding: Vec<String> = inner
            .previews
            .values()
            .filter(|p| !p.state.is_terminal())
            .map(|p| p.id.clone())
            .collect();
        if outstanding.is_empty() {
            inner.running = false;
            return None;
        }
        if inner.attempts >= self.max_attempts {
            log::warn!(
                "Giving up on {} pending upload(s) after {} polls",
                outstanding.len(),
                inner.attempts
            );
            inner.running = false;
            return None;
        }
        inner.attempts += 1;
        Some(outstanding)
    }

    async fn run(self) {
        loop {
            tokio::time::sleep(self.interval).await;
            let Some(ids) = self.next_batch() else {
                break;
            };
            match self.source.fetch_status(&ids).await {
                Ok(items) => {
                    let mut inner = self.inner();
                    for item in &items {
                        if let Some(preview) = inner.previews.get_mut(&item.id) {
                            reconcile(preview, item);
                        }
                    }
                }
                Err(e) => log::warn!("Pending status poll failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::media::PendingKind;
    use std::collections::VecDeque;

    fn item(id: &str, status: PendingStatus, final_url: Option<&str>) -> PendingStatusItem {
        PendingStatusItem {
            id: id.to_string(),
            status,
            kind: PendingKind::Video,
            final_key: final_url.map(|_| format!("processed/{id}-720p.mp4")),
            final_url: final_url.map(str::to_string),
            original_url: None,
            thumbnail_url: None,
            duration_seconds: None,
            error: None,
        }
    }

    #[test]
    fn ready_without_url_is_not_ready() {
        let mut preview = PendingPreview::queued("p1");
        reconcile(&mut preview, &item("p1", PendingStatus::Transcoding, None));
        assert_eq!(preview.state, PreviewState::Processing);

        reconcile(&mut preview, &item("p1", PendingStatus::Ready, None));
        assert_eq!(preview.state, PreviewState::Processing);
        assert!(preview.final_url.is_none());

        reconcile(&mut preview, &item("p1", PendingStatus::Ready, Some("http://x/p1.mp4")));
        assert_eq!(preview.state, PreviewState::Ready);
        assert_eq!(preview.final_url.as_deref(), Some("http://x/p1.mp4"));
    }

    #[test]
    fn failure_carries_error() {
        let mut preview = PendingPreview::queued("p1");
        let mut failed = item("p1", PendingStatus::Failed, None);
        failed.error = Some("ffmpeg exited with 1".into());
        reconcile(&mut preview, &failed);
        assert_eq!(preview.state, PreviewState::Failed);
        assert_eq!(preview.error.as_deref(), Some("ffmpeg exited with 1"));
    }

    /// Replays scripted responses and records the ids of every request.
    struct Scripted {
        responses: Mutex<VecDeque<Vec<PendingStatusItem>>>,
        requests: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Vec<PendingStatusItem>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Vec<String>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PendingStatusSource for Scripted {
        async fn fetch_status(&self, ids: &[String]) -> anyhow::Result<Vec<PendingStatusItem>> {
            self.requests.lock().unwrap().push(ids.to_vec());
            Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    async fn tick(interval: Duration) {
        tokio::time::sleep(interval).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_settled_then_stops() {
        let interval = Duration::from_secs(3);
        let source = Scripted::new(vec![
            vec![
                item("a", PendingStatus::Ready, None),
                item("b", PendingStatus::Transcoding, None),
            ],
            vec![
                item("a", PendingStatus::Ready, Some("http://x/a.mp4")),
                item("b", PendingStatus::Failed, None),
            ],
        ]);
        let poller = PendingMediaPoller::new(source.clone(), interval, 50);
        poller.track(PendingPreview::queued("a"));
        poller.track(PendingPreview::queued("b"));
        assert!(poller.is_running());

        tick(interval).await;
        assert_eq!(poller.get("a").unwrap().state, PreviewState::Queued);
        assert_eq!(poller.get("b").unwrap().state, PreviewState::Processing);

        tick(interval).await;
        assert_eq!(poller.get("a").unwrap().state, PreviewState::Ready);
        assert_eq!(poller.get("b").unwrap().state, PreviewState::Failed);

        tick(interval).await;
        assert!(!poller.is_running());
        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], vec!["a".to_string(), "b".to_string()]);

        poller.track(PendingPreview::queued("c"));
        assert!(poller.is_running());
        tick(interval).await;
        assert_eq!(source.requests().last().unwrap(), &vec!["c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_cap_stops_polling() {
        let interval = Duration::from_millis(100);
        let source = Scripted::new(Vec::new());
        let poller = PendingMediaPoller::new(source.clone(), interval, 3);
        poller.track(PendingPreview::queued("stuck"));
        for _ in 0..6 {
            tick(interval).await;
        }
        assert!(!poller.is_running());
        assert_eq!(source.requests().len(), 3);
    }
}
