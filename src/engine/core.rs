mod error;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod planner;
mod retry;
mod types;

pub use error::{CompressError, PlanError};
pub use ffmpeg_cmd::{
    EncoderSettings, FfmpegEncoder, MediaEncoder, build_encode_cmd, format_ffmpeg_cmd,
    run_ffmpeg_once,
};
pub use ffmpeg_info::{encoder_available, ffmpeg_version, ffprobe_version};
pub use planner::{
    DEFAULT_BUFFER_SIZE_FACTOR, DEFAULT_FIRST_AUDIO_BITRATE_KBPS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_BITRATE_FACTOR, DEFAULT_OVERHEAD_FRACTION, DEFAULT_RETRY_AUDIO_BITRATE_KBPS,
    DEFAULT_RETRY_MARGIN, RatePolicy, decide_retry, plan_initial_bitrate,
};
pub use retry::{
    HeldArtifact, compress_to_target, compress_to_target_with_callback, probe_input, run_attempt,
    temp_artifact_path,
};
pub use types::{
    AttemptRecord, BYTES_PER_MB, CompressReport, CompressStatus, EncodeOutcome, EncodeRequest,
    MediaInfo, ProgressParser, RetryDecision, bytes_to_mb,
};
