use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::planner::RatePolicy;

/// Bytes per megabyte as used for every size comparison (MiB)
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Duration and byte size of a probed input, immutable once produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

impl MediaInfo {
    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size_bytes)
    }
}

/// Parameters for a single encode attempt
///
/// Built fresh for every attempt through [`EncodeRequest::new`]; the ceiling and
/// buffer are derived from the video bitrate and the policy factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub video_bitrate_kbps: u32,
    pub max_bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

impl EncodeRequest {
    pub fn new(
        input_path: &Path,
        output_path: &Path,
        video_bitrate_kbps: u32,
        audio_bitrate_kbps: u32,
        policy: &RatePolicy,
    ) -> Self {
        let scaled = |factor: f64| (video_bitrate_kbps as f64 * factor).round() as u32;

        Self {
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            video_bitrate_kbps,
            max_bitrate_kbps: scaled(policy.max_bitrate_factor),
            buffer_size_kbps: scaled(policy.buffer_size_factor),
            audio_bitrate_kbps,
        }
    }
}

/// Result of one encode attempt. A size is only present when the encoder succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeOutcome {
    pub success: bool,
    pub output_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl EncodeOutcome {
    pub fn succeeded(output_size_bytes: u64) -> Self {
        Self {
            success: true,
            output_size_bytes: Some(output_size_bytes),
            failure: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            output_size_bytes: None,
            failure: Some(reason.into()),
        }
    }

    pub fn output_size_mb(&self) -> Option<f64> {
        self.output_size_bytes.map(bytes_to_mb)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Output fits the target
    Done,
    /// Encoder failed; nothing to correct
    Abort,
    /// Output overshot; re-encode at the corrected bitrate
    RetryWith { video_bitrate_kbps: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressStatus {
    /// Output written and within the target size
    Done,
    /// Output written but still above the target size
    TargetMissed,
}

/// What happened during one attempt, for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub outcome: EncodeOutcome,
}

/// Final summary of a compression run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressReport {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub status: CompressStatus,
    pub source: MediaInfo,
    pub target_size_mb: f64,
    pub initial_bitrate_kbps: u32,
    pub attempts: Vec<AttemptRecord>,
    pub final_size_bytes: u64,
    pub finished_at: DateTime<Utc>,
}

impl CompressReport {
    pub fn final_size_mb(&self) -> f64 {
        bytes_to_mb(self.final_size_bytes)
    }

    /// Size reduction relative to the source, in percent
    pub fn compression_pct(&self) -> Option<f64> {
        if self.source.size_bytes == 0 {
            return None;
        }
        Some((1.0 - self.final_size_bytes as f64 / self.source.size_bytes as f64) * 100.0)
    }
}

/// Parser for ffmpeg `-progress` output (key=value lines)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub speed: Option<f64>,
    pub total_size: Option<u64>,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(&mut self, line: &str) {
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let value = value.trim();
        match key.trim() {
            "out_time_us" => {
                // ffmpeg reports N/A before the first frame is muxed
                if let Ok(us) = value.parse::<u64>() {
                    self.out_time_us = us;
                }
            }
            "speed" => {
                if let Ok(s) = value.trim_end_matches('x').parse::<f64>() {
                    self.speed = Some(s);
                }
            }
            "total_size" => {
                if let Ok(size) = value.parse::<u64>() {
                    self.total_size = Some(size);
                }
            }
            "progress" => self.is_complete = value == "end",
            _ => {}
        }
    }

    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }
}
