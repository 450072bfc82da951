// End-to-end tests that actually run ffmpeg and ffprobe
//
// Skipped when the tools (or libx264) are not installed.

use ffshrink::engine::{
    CompressStatus, EncodeRequest, EncoderSettings, FfmpegEncoder, FfprobeProber, MediaProber,
    RatePolicy, compress_to_target, encoder_available, run_attempt, temp_artifact_path,
};
use std::path::PathBuf;
use tempfile::TempDir;

use crate::common::helpers::*;

// Helper to check if FFmpeg is available, skip test if not
macro_rules! require_ffmpeg {
    () => {
        if !is_ffmpeg_available() || !encoder_available("ffmpeg", "libx264") {
            eprintln!("Skipping test: FFmpeg with libx264 not available");
            return;
        }
    };
}

fn create_test_video(temp_dir: &TempDir) -> PathBuf {
    let video_path = temp_dir.path().join("test_input.mp4");

    // High-detail source so the compressed result is clearly smaller
    generate_test_video(&video_path, 4.0, 640, 360).expect("Failed to generate test video");

    video_path
}

fn quick_settings() -> EncoderSettings {
    EncoderSettings {
        preset: "ultrafast".to_string(),
        ..EncoderSettings::default()
    }
}

#[test]
fn e2e_probe_generated_video() {
    require_ffmpeg!();

    let temp_dir = TempDir::new().unwrap();
    let input = create_test_video(&temp_dir);

    let info = FfprobeProber::default().probe(&input).unwrap();
    assert!((info.duration_seconds - 4.0).abs() < 0.2, "duration {}", info.duration_seconds);
    assert_eq!(info.size_bytes, std::fs::metadata(&input).unwrap().len());
}

#[test]
fn e2e_compress_below_half_the_source_size() {
    require_ffmpeg!();

    let temp_dir = TempDir::new().unwrap();
    let input = create_test_video(&temp_dir);
    let output = temp_dir.path().join("test_output.mp4");

    let prober = FfprobeProber::default();
    let source = prober.probe(&input).unwrap();
    let target_mb = source.size_mb() / 2.0;

    let encoder = FfmpegEncoder::new(quick_settings(), true);
    let policy = RatePolicy {
        max_attempts: 3,
        ..RatePolicy::default()
    };

    let report =
        compress_to_target(&prober, &encoder, &policy, &input, &output, target_mb).unwrap();

    assert!(output.exists());
    assert!(!temp_artifact_path(&output, 1).exists());
    assert!(!temp_artifact_path(&output, 2).exists());
    assert_eq!(report.final_size_bytes, std::fs::metadata(&output).unwrap().len());
    if report.status == CompressStatus::Done {
        assert!(report.final_size_mb() <= target_mb);
    }

    // The result is a playable file of the same length
    let result = prober.probe(&output).unwrap();
    assert!((result.duration_seconds - source.duration_seconds).abs() < 0.5);
}

#[test]
fn e2e_missing_input_fails_the_attempt() {
    require_ffmpeg!();

    let temp_dir = TempDir::new().unwrap();
    let request = EncodeRequest::new(
        &temp_dir.path().join("does_not_exist.mp4"),
        &temp_dir.path().join("out.mp4"),
        500,
        128,
        &RatePolicy::default(),
    );

    let encoder = FfmpegEncoder::new(quick_settings(), true);
    let outcome = run_attempt(&encoder, &request);

    assert!(!outcome.success);
    assert_eq!(outcome.output_size_bytes, None);
    assert!(outcome.failure.is_some());
}
