use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

fn tool_runs(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Whether both ffmpeg and ffprobe can be executed
pub fn is_ffmpeg_available() -> bool {
    tool_runs("ffmpeg") && tool_runs("ffprobe")
}

/// Generate a small H.264/AAC test clip with ffmpeg's lavfi sources
pub fn generate_test_video(path: &Path, duration_secs: f32, width: u32, height: u32) -> Result<()> {
    let status = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-f", "lavfi", "-i"])
        .arg(format!(
            "testsrc2=size={}x{}:rate=25:duration={}",
            width, height, duration_secs
        ))
        .args(["-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=440:duration={}", duration_secs))
        .args(["-c:v", "libx264", "-preset", "ultrafast", "-crf", "18"])
        .args(["-c:a", "aac", "-shortest"])
        .arg(path)
        .status()
        .context("Failed to run ffmpeg to generate a test video")?;

    if !status.success() {
        anyhow::bail!("ffmpeg failed to generate {}", path.display());
    }
    Ok(())
}
