// Input probing using ffprobe

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Command;

use super::core::MediaInfo;

/// Something that can report the duration and size of a media file
pub trait MediaProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo>;
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<Value>,
    size: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

/// ffprobe prints numbers as strings in its JSON writer; accept both forms
fn value_as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the `format` section of `ffprobe -of json` output into [`MediaInfo`]
///
/// Both `duration` and `size` must be present and parse; the duration must be
/// a positive, finite number of seconds.
pub fn parse_probe_report(json: &str) -> Result<MediaInfo> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;

    let duration_str = probe
        .format
        .duration
        .as_ref()
        .and_then(value_as_str)
        .context("No duration found in ffprobe output")?;
    let duration_seconds = duration_str
        .parse::<f64>()
        .with_context(|| format!("Failed to parse duration '{}' as float", duration_str))?;

    if !(duration_seconds > 0.0) || !duration_seconds.is_finite() {
        anyhow::bail!("ffprobe reported a non-positive duration: {}", duration_str);
    }

    let size_str = probe
        .format
        .size
        .as_ref()
        .and_then(value_as_str)
        .context("No size found in ffprobe output")?;
    let size_bytes = size_str
        .parse::<u64>()
        .with_context(|| format!("Failed to parse size '{}' as integer", size_str))?;

    Ok(MediaInfo {
        duration_seconds,
        size_bytes,
    })
}

/// [`MediaProber`] backed by the ffprobe CLI
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: String,
}

impl FfprobeProber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration,size",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .with_context(|| format!("Failed to execute {}", self.program))?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_probe_report(&String::from_utf8_lossy(&output.stdout))
            .with_context(|| format!("Unusable probe report for {}", path.display()))
    }
}
