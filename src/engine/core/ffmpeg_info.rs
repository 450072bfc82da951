use anyhow::{Context, Result};
use std::process::Command;

/// First line of `<program> -version`, e.g. "ffmpeg version 7.1 Copyright ..."
fn tool_version(program: &str) -> Result<String> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {}. Is it installed and in PATH?", program))?;

    if !output.status.success() {
        anyhow::bail!("{} -version failed with status: {}", program, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version(program: &str) -> Result<String> {
    tool_version(program)
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version(program: &str) -> Result<String> {
    tool_version(program)
}

/// Whether ffmpeg lists the given encoder in `-encoders`
pub fn encoder_available(program: &str, encoder: &str) -> bool {
    let output = Command::new(program)
        .arg("-hide_banner")
        .arg("-encoders")
        .output();

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .any(|line| line.split_whitespace().nth(1) == Some(encoder)),
        _ => false,
    }
}
