pub mod correlator;
pub mod finalize;
pub mod registrar;
pub mod telemetry;
pub mod video_processor;

pub use correlator::{HttpJobDispatcher, JobDispatcher};
pub use registrar::MediaRegistrar;
pub use telemetry::{Counter, MediaTelemetry};
pub use video_processor::{FfmpegTranscoder, TranscodeJob, VideoProcessor};
