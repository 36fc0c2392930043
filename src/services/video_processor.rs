// src/services/video_processor.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::FfmpegConfig;
use crate::db::models::{CaptainVideoUpdate, PendingMediaUpdate};
use crate::db::Repository;
use crate::domain::media::{PendingStatus, ProcessStatus};
use crate::storage::LocalBlobStore;

/// Work accepted by the transcode worker.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeJob {
    /// New pipeline: a `CaptainVideo` row.
    Video { video_id: Uuid },
    /// Legacy pipeline: a `PendingMedia` row, optionally correlated.
    Legacy {
        pending_id: Uuid,
        captain_video_id: Option<Uuid>,
    },
}

pub type JobSender = mpsc::Sender<TranscodeJob>;

/// Paths the transcoder writes to.
#[derive(Debug, Clone)]
pub struct TranscodeTarget<'a> {
    pub input: &'a Path,
    pub video: &'a Path,
    pub thumbnail: &'a Path,
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Produce the 720p rendition and a thumbnail; returns the duration when known.
    async fn transcode(&self, target: TranscodeTarget<'_>) -> Result<Option<f64>>;

    /// Duration of an already rendered output.
    async fn duration(&self, video: &Path) -> Option<f64>;
}

pub struct FfmpegTranscoder {
    config: FfmpegConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, target: TranscodeTarget<'_>) -> Result<Option<f64>> {
        transcode_to_720p(target.input, target.video, &self.config).await?;
        generate_thumbnail(target.input, target.thumbnail).await?;
        Ok(self.duration(target.video).await)
    }

    // Informational; a failing probe does not fail the job.
    async fn duration(&self, video: &Path) -> Option<f64> {
        match probe_duration(video).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                log::warn!("ffprobe failed for {}: {}", video.display(), e);
                None
            }
        }
    }
}

async fn transcode_to_720p(input: &Path, output: &Path, config: &FfmpegConfig) -> Result<()> {
    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(input)
        .arg("-c:v")
        .arg("libx264")
        .arg("-c:a")
        .arg("aac")
        .arg("-b:a")
        .arg("128k")
        .arg("-vf")
        .arg("scale=-2:720")
        .arg("-preset")
        .arg(&config.preset)
        .arg("-threads")
        .arg(config.thread_count.to_string())
        .arg("-movflags")
        .arg("+faststart")
        .arg(output)
        .status()
        .await?;

    if !status.success() {
        return Err(anyhow::anyhow!("FFmpeg transcoding failed"));
    }

    Ok(())
}

async fn generate_thumbnail(input: &Path, output: &Path) -> Result<()> {
    let status = Command::new("ffmpeg")
        .arg("-y")
        .arg("-ss")
        .arg("1")
        .arg("-i")
        .arg(input)
        .arg("-frames:v")
        .arg("1")
        .arg("-vf")
        .arg("scale=320:-1")
        .arg(output)
        .status()
        .await?;

    if !status.success() {
        return Err(anyhow::anyhow!("Thumbnail generation failed"));
    }

    Ok(())
}

async fn probe_duration(input: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(input)
        .output()
        .await?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe exited with {}", output.status));
    }
    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .context("Invalid duration format")
}

/// Sibling path the transcoder writes to before the output is moved into
/// place. Keeps the extension so ffmpeg still picks the container.
fn staging_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.part.{ext}"),
        None => format!("{stem}.part"),
    };
    path.with_file_name(name)
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove staged output {}: {}", path.display(), e);
        }
    }
}

/// Keys of the processed rendition and thumbnail for an original upload.
///
/// Deterministic, so both pipelines land on the same output.
pub fn output_keys(original_key: &str) -> (String, String) {
    let base = match original_key.rsplit_once("/temp/") {
        Some((dir, file)) => format!("{dir}/processed/{file}"),
        None => format!("processed/{original_key}"),
    };
    let stem = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.ends_with('/') && !ext.contains('/') => stem.to_string(),
        _ => base,
    };
    (format!("{stem}-720p.mp4"), format!("{stem}-thumb.jpg"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedVideo {
    pub key: String,
    pub url: String,
    pub thumbnail_key: String,
    pub thumbnail_url: String,
    pub duration_seconds: Option<f64>,
    pub reused: bool,
}

pub struct VideoProcessor {
    repo: Arc<dyn Repository>,
    blobs: LocalBlobStore,
    transcoder: Arc<dyn Transcoder>,
}

impl VideoProcessor {
    pub fn new(
        repo: Arc<dyn Repository>,
        blobs: LocalBlobStore,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            repo,
            blobs,
            transcoder,
        }
    }

    pub async fn handle(&self, job: TranscodeJob) {
        let result = match &job {
            TranscodeJob::Video { video_id } => self.process_captain_video(*video_id).await,
            TranscodeJob::Legacy {
                pending_id,
                captain_video_id,
            } => self.process_pending(*pending_id, *captain_video_id).await,
        };
        if let Err(e) = result {
            log::error!("Error processing {:?}: {:#}", job, e);
        }
    }

    async fn render(&self, original_key: &str) -> Result<ProcessedVideo> {
        let (key, thumbnail_key) = output_keys(original_key);
        let url = self.blobs.url_for(&key);
        let thumbnail_url = self.blobs.url_for(&thumbnail_key);
        let video = self.blobs.path_for(&key)?;
        let thumbnail = self.blobs.path_for(&thumbnail_key)?;

        // Outputs only appear at their final keys after a successful run.
        if self.blobs.exists(&key).await && self.blobs.exists(&thumbnail_key).await {
            log::info!("Reusing processed output {} for {}", key, original_key);
            return Ok(ProcessedVideo {
                key,
                url,
                thumbnail_key,
                thumbnail_url,
                duration_seconds: self.transcoder.duration(&video).await,
                reused: true,
            });
        }

        let input = self.blobs.path_for(original_key)?;
        if let Some(parent) = video.parent() {
            fs::create_dir_all(parent).await?;
        }
        let staged_video = staging_path(&video);
        let staged_thumbnail = staging_path(&thumbnail);

        let result = self
            .transcoder
            .transcode(TranscodeTarget {
                input: &input,
                video: &staged_video,
                thumbnail: &staged_thumbnail,
            })
            .await;
        let duration_seconds = match result {
            Ok(duration) => duration,
            Err(e) => {
                discard(&staged_video).await;
                discard(&staged_thumbnail).await;
                return Err(e);
            }
        };

        fs::rename(&staged_thumbnail, &thumbnail)
            .await
            .with_context(|| format!("moving thumbnail into {}", thumbnail_key))?;
        fs::rename(&staged_video, &video)
            .await
            .with_context(|| format!("moving rendition into {}", key))?;

        Ok(ProcessedVideo {
            key,
            url,
            thumbnail_key,
            thumbnail_url,
            duration_seconds,
            reused: false,
        })
    }

    async fn process_captain_video(&self, video_id: Uuid) -> Result<()> {
        let Some(video) = self.repo.get_captain_video(video_id).await? else {
            log::warn!("Captain video {} not found, dropping job", video_id);
            return Ok(());
        };
        if ProcessStatus::parse(&video.process_status) == Some(ProcessStatus::Ready) {
            return Ok(());
        }

        self.repo
            .update_captain_video(
                video_id,
                CaptainVideoUpdate {
                    process_status: Some(ProcessStatus::Processing.as_str().to_string()),
                    ..Default::default()
                },
            )
            .await?;

        match self.render(&video.blob_key).await {
            Ok(done) => {
                self.repo
                    .update_captain_video(
                        video_id,
                        CaptainVideoUpdate {
                            process_status: Some(ProcessStatus::Ready.as_str().to_string()),
                            ready_720p_url: Some(done.url.clone()),
                            thumbnail_url: Some(done.thumbnail_url.clone()),
                            processed_duration_sec: done.duration_seconds,
                            ..Default::default()
                        },
                    )
                    .await?;
                self.mark_legacy_rows(&video.blob_key, &done).await;
                log::info!("Captain video {} ready at {}", video_id, done.url);
            }
            Err(e) => {
                log::error!("Transcode failed for captain video {}: {:#}", video_id, e);
                self.repo
                    .update_captain_video(
                        video_id,
                        CaptainVideoUpdate {
                            process_status: Some(ProcessStatus::Failed.as_str().to_string()),
                            error_message: Some(e.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn process_pending(&self, pending_id: Uuid, captain_video_id: Option<Uuid>) -> Result<()> {
        let Some(pending) = self.repo.get_pending_media(pending_id).await? else {
            log::warn!("Pending media {} not found, dropping job", pending_id);
            return Ok(());
        };
        if matches!(
            PendingStatus::parse(&pending.status),
            Some(PendingStatus::Ready | PendingStatus::Failed)
        ) {
            return Ok(());
        }

        self.repo
            .update_pending_media(
                pending_id,
                PendingMediaUpdate {
                    status: Some(PendingStatus::Transcoding.as_str().to_string()),
                    correlation_id: captain_video_id.map(|id| id.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        match self.render(&pending.original_key).await {
            Ok(done) => {
                self.repo
                    .update_pending_media(
                        pending_id,
                        PendingMediaUpdate {
                            status: Some(PendingStatus::Ready.as_str().to_string()),
                            final_key: Some(done.key.clone()),
                            final_url: Some(done.url.clone()),
                            thumbnail_key: Some(done.thumbnail_key.clone()),
                            thumbnail_url: Some(done.thumbnail_url.clone()),
                            duration_seconds: done.duration_seconds,
                            ..Default::default()
                        },
                    )
                    .await?;
                self.mark_legacy_rows(&pending.original_key, &done).await;
            }
            Err(e) => {
                log::error!("Transcode failed for pending media {}: {:#}", pending_id, e);
                self.repo
                    .update_pending_media(
                        pending_id,
                        PendingMediaUpdate {
                            status: Some(PendingStatus::Failed.as_str().to_string()),
                            error: Some(e.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn mark_legacy_rows(&self, original_key: &str, done: &ProcessedVideo) {
        match self
            .repo
            .mark_charter_media_processed(
                original_key,
                &done.url,
                Some(&done.thumbnail_url),
                done.duration_seconds,
            )
            .await
        {
            Ok(0) => {}
            Ok(n) => log::info!("Updated {} legacy media rows for {}", n, original_key),
            Err(e) => log::error!("Failed to update legacy media for {}: {}", original_key, e),
        }
    }
}

/// Start the single worker task draining `jobs` until every sender is dropped.
pub fn spawn_worker(
    processor: Arc<VideoProcessor>,
    mut jobs: mpsc::Receiver<TranscodeJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            processor.handle(job).await;
        }
        log::info!("Transcode worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{CaptainVideo, PendingMedia};
    use crate::db::MemoryRepository;
    use crate::domain::media::PendingKind;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Copies the input instead of invoking ffmpeg. The first `failures`
    /// runs write a truncated rendition and then error.
    #[derive(Default)]
    struct CopyTranscoder {
        runs: AtomicUsize,
        failures: usize,
    }

    impl CopyTranscoder {
        fn failing(failures: usize) -> Self {
            Self {
                failures,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Transcoder for CopyTranscoder {
        async fn transcode(&self, target: TranscodeTarget<'_>) -> Result<Option<f64>> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.failures {
                fs::write(target.video, b"trunc").await?;
                return Err(anyhow::anyhow!("codec not supported"));
            }
            fs::copy(target.input, target.video).await?;
            fs::write(target.thumbnail, b"jpg").await?;
            Ok(Some(12.5))
        }

        async fn duration(&self, _video: &Path) -> Option<f64> {
            Some(12.5)
        }
    }

    const ORIGINAL: &str = "charters/c1/media/temp/1700-boat.mp4";

    async fn setup(
        transcoder: Arc<CopyTranscoder>,
    ) -> (tempfile::TempDir, Arc<MemoryRepository>, VideoProcessor) {
        let dir = tempfile::tempdir().unwrap();
        let blobs = LocalBlobStore::new(dir.path(), "http://localhost/media");
        blobs.put(ORIGINAL, b"video-bytes").await.unwrap();
        let repo = Arc::new(MemoryRepository::new());
        let processor = VideoProcessor::new(repo.clone(), blobs, transcoder);
        (dir, repo, processor)
    }

    fn captain_video(owner: Uuid) -> CaptainVideo {
        let now = Utc::now().naive_utc();
        CaptainVideo {
            id: Uuid::new_v4(),
            owner_id: owner,
            original_url: format!("http://localhost/media/{ORIGINAL}"),
            blob_key: ORIGINAL.into(),
            process_status: "queued".into(),
            ready_720p_url: None,
            thumbnail_url: None,
            processed_duration_sec: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn pending(owner: Uuid) -> PendingMedia {
        let now = Utc::now().naive_utc();
        PendingMedia {
            id: Uuid::new_v4(),
            status: PendingStatus::Queued.as_str().into(),
            kind: PendingKind::Video.as_str().into(),
            original_key: ORIGINAL.into(),
            original_url: format!("http://localhost/media/{ORIGINAL}"),
            final_key: None,
            final_url: None,
            thumbnail_key: None,
            thumbnail_url: None,
            size_bytes: Some(11),
            mime_type: Some("video/mp4".into()),
            correlation_id: None,
            error: None,
            owner_id: owner,
            charter_id: Some("c1".into()),
            duration_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn output_keys_move_out_of_temp() {
        let (video, thumb) = output_keys(ORIGINAL);
        assert_eq!(video, "charters/c1/media/processed/1700-boat-720p.mp4");
        assert_eq!(thumb, "charters/c1/media/processed/1700-boat-thumb.jpg");

        let (video, _) = output_keys("captains/u/media/clip");
        assert_eq!(video, "processed/captains/u/media/clip-720p.mp4");
    }

    #[test]
    fn parses_ffprobe_output() {
        assert_eq!(parse_duration("42.120000\n").unwrap(), 42.12);
        assert!(parse_duration("N/A").is_err());
    }

    #[tokio::test]
    async fn both_pipelines_share_one_transcode() {
        let transcoder = Arc::new(CopyTranscoder::default());
        let (_dir, repo, processor) = setup(transcoder.clone()).await;
        let owner = Uuid::new_v4();
        let video = repo.insert_captain_video(captain_video(owner)).await.unwrap();
        let record = repo.insert_pending_media(pending(owner)).await.unwrap();

        processor.handle(TranscodeJob::Video { video_id: video.id }).await;
        processor
            .handle(TranscodeJob::Legacy {
                pending_id: record.id,
                captain_video_id: Some(video.id),
            })
            .await;

        assert_eq!(transcoder.runs.load(Ordering::SeqCst), 1);

        let video = repo.get_captain_video(video.id).await.unwrap().unwrap();
        assert_eq!(video.process_status, "ready");
        assert_eq!(video.processed_duration_sec, Some(12.5));

        let record = repo.get_pending_media(record.id).await.unwrap().unwrap();
        assert_eq!(record.status, "READY");
        assert_eq!(
            record.final_url.as_deref(),
            video.ready_720p_url.as_deref()
        );
        assert_eq!(record.correlation_id, Some(video.id.to_string()));
        assert_eq!(record.duration_seconds, Some(12.5));
    }

    #[tokio::test]
    async fn output_of_a_failed_run_is_never_reused() {
        let transcoder = Arc::new(CopyTranscoder::failing(1));
        let (dir, repo, processor) = setup(transcoder.clone()).await;
        let owner = Uuid::new_v4();
        let video = repo.insert_captain_video(captain_video(owner)).await.unwrap();
        let record = repo.insert_pending_media(pending(owner)).await.unwrap();

        processor.handle(TranscodeJob::Video { video_id: video.id }).await;
        let video = repo.get_captain_video(video.id).await.unwrap().unwrap();
        assert_eq!(video.process_status, "failed");
        let (key, _) = output_keys(ORIGINAL);
        assert!(!dir.path().join(&key).exists());
        let processed = dir.path().join("charters/c1/media/processed");
        assert_eq!(std::fs::read_dir(processed).unwrap().count(), 0);

        processor
            .handle(TranscodeJob::Legacy {
                pending_id: record.id,
                captain_video_id: Some(video.id),
            })
            .await;
        assert_eq!(transcoder.runs.load(Ordering::SeqCst), 2);
        let record = repo.get_pending_media(record.id).await.unwrap().unwrap();
        assert_eq!(record.status, "READY");
        assert_eq!(std::fs::read(dir.path().join(&key)).unwrap(), b"video-bytes");
        assert_eq!(record.duration_seconds, Some(12.5));
    }

    #[test]
    fn staging_keeps_the_container_extension() {
        let staged = staging_path(Path::new("/m/processed/1-boat-720p.mp4"));
        assert_eq!(staged, Path::new("/m/processed/1-boat-720p.part.mp4"));
    }

    #[tokio::test]
    async fn failure_marks_both_records_failed() {
        let transcoder = Arc::new(CopyTranscoder::failing(usize::MAX));
        let (_dir, repo, processor) = setup(transcoder).await;
        let owner = Uuid::new_v4();
        let video = repo.insert_captain_video(captain_video(owner)).await.unwrap();
        let record = repo.insert_pending_media(pending(owner)).await.unwrap();

        processor.handle(TranscodeJob::Video { video_id: video.id }).await;
        processor
            .handle(TranscodeJob::Legacy {
                pending_id: record.id,
                captain_video_id: None,
            })
            .await;

        let video = repo.get_captain_video(video.id).await.unwrap().unwrap();
        assert_eq!(video.process_status, "failed");
        assert!(video.error_message.unwrap().contains("codec"));

        let record = repo.get_pending_media(record.id).await.unwrap().unwrap();
        assert_eq!(record.status, "FAILED");
        assert!(record.final_url.is_none());
    }

    #[tokio::test]
    async fn worker_drains_channel_until_closed() {
        let transcoder = Arc::new(CopyTranscoder::default());
        let (_dir, repo, processor) = setup(transcoder).await;
        let video = repo
            .insert_captain_video(captain_video(Uuid::new_v4()))
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_worker(Arc::new(processor), rx);
        tx.send(TranscodeJob::Video { video_id: video.id }).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let video = repo.get_captain_video(video.id).await.unwrap().unwrap();
        assert_eq!(video.process_status, "ready");
    }
}
