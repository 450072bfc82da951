// Integration tests for config file handling
//
// These verify that a config file on disk drives the policy and encoder
// settings the controller sees.

use ffshrink::config::Config;
use ffshrink::engine::{CompressStatus, RatePolicy, compress_to_target};
use std::fs;
use tempfile::TempDir;

use crate::common::fakes::*;

#[test]
fn test_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[defaults]
target_size_mb = 8.0
quiet = true

[policy]
overhead_fraction = 0.15
retry_margin = 0.9
max_bitrate_factor = 1.5
buffer_size_factor = 3.0
first_audio_bitrate_kbps = 160
retry_audio_bitrate_kbps = 64
max_attempts = 4

[encoder]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
ffprobe_path = "/opt/ffmpeg/bin/ffprobe"
preset = "veryslow"
faststart = false
extra_args = "-tune film"
timeout_secs = 900
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.defaults.target_size_mb, 8.0);
    assert!(config.defaults.quiet);
    assert_eq!(
        config.policy,
        RatePolicy {
            overhead_fraction: 0.15,
            retry_margin: 0.9,
            max_bitrate_factor: 1.5,
            buffer_size_factor: 3.0,
            first_audio_bitrate_kbps: 160,
            retry_audio_bitrate_kbps: 64,
            max_attempts: 4,
        }
    );
    assert_eq!(config.encoder.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
    assert_eq!(config.encoder.preset, "veryslow");
    assert!(!config.encoder.faststart);
    assert_eq!(config.encoder.extra_args, "-tune film");
    assert_eq!(config.encoder.timeout_secs, Some(900));
    // Untouched keys keep their defaults
    assert_eq!(config.encoder.video_codec, "libx264");
}

#[test]
fn test_empty_config_file_is_all_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "").unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.policy, RatePolicy::default());
    assert_eq!(config.defaults.target_size_mb, 100.0);
}

#[test]
fn test_malformed_config_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[policy\nretry_margin = ").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("config.toml"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_config_policy_drives_retry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "[policy]\nretry_audio_bitrate_kbps = 64\nmax_attempts = 3\n",
    )
    .unwrap();
    let config = Config::load_from(&path).unwrap();

    let input = dir.path().join("in.mp4");
    fs::write(&input, b"x").unwrap();
    let output = dir.path().join("out.mp4");

    let prober = FakeProber::new(60.0, 400 * MB);
    let encoder = FakeEncoder::new(vec![
        Step::Write(150 * MB),
        Step::Write(120 * MB),
        Step::Write(90 * MB),
    ]);

    let report = compress_to_target(
        &prober,
        &encoder,
        &config.policy,
        &input,
        &output,
        config.defaults.target_size_mb,
    )
    .unwrap();

    assert_eq!(report.status, CompressStatus::Done);
    assert_eq!(encoder.attempts(), 3);
    assert_eq!(encoder.request(1).audio_bitrate_kbps, 64);
    assert_eq!(encoder.request(2).audio_bitrate_kbps, 64);
}

#[test]
fn test_saved_default_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ffshrink").join("config.toml");

    Config::default().save_to(&path).unwrap();
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("[policy]"));
    assert!(contents.contains("[encoder]"));

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.policy, RatePolicy::default());
    assert_eq!(loaded.encoder.preset, "slow");
}
