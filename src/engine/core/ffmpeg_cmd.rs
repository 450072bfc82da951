use super::types::{EncodeRequest, ProgressParser, bytes_to_mb};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How many trailing stderr lines end up in an encode failure message
const STDERR_TAIL_LINES: usize = 5;

/// Encoder-side settings that stay fixed across attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// ffmpeg executable name or path
    pub ffmpeg_path: String,

    /// ffprobe executable name or path
    pub ffprobe_path: String,

    pub video_codec: String,
    pub audio_codec: String,

    /// x264 speed/quality preset
    pub preset: String,

    /// Move the moov atom to the front for progressive playback
    pub faststart: bool,

    /// Extra ffmpeg arguments inserted before the output path (shell-style quoting)
    pub extra_args: String,

    /// Wall-clock cap per encode attempt; expiry counts as an encoder failure
    pub timeout_secs: Option<u64>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "slow".to_string(),
            faststart: true,
            extra_args: String::new(),
            timeout_secs: None,
        }
    }
}

impl EncoderSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Something that turns an [`EncodeRequest`] into an output file
///
/// `Ok` means the encoder reported success; the caller measures the output.
pub trait MediaEncoder {
    fn encode(&self, request: &EncodeRequest) -> Result<()>;
}

/// Apply additional user-provided FFmpeg arguments to the command.
/// Uses shell-style parsing so quoted strings with spaces are preserved.
fn apply_additional_args(cmd: &mut Command, additional_args: &str) {
    if additional_args.trim().is_empty() {
        return;
    }

    match shlex::split(additional_args) {
        Some(args) => {
            cmd.args(args);
        }
        None => {
            warn!(
                args = additional_args,
                "unbalanced quotes in extra args, splitting on whitespace"
            );
            cmd.args(additional_args.split_whitespace());
        }
    }
}

/// Build the constrained-bitrate ffmpeg command for one attempt
///
/// `-maxrate`/`-bufsize` form a leaky bucket around the average `-b:v`.
pub fn build_encode_cmd(request: &EncodeRequest, settings: &EncoderSettings) -> Command {
    let mut cmd = Command::new(&settings.ffmpeg_path);

    cmd.arg("-hide_banner")
        .arg("-y")
        .arg("-i")
        .arg(&request.input_path)
        .arg("-progress")
        .arg("-")
        .arg("-nostats");

    cmd.arg("-c:v")
        .arg(&settings.video_codec)
        .arg("-b:v")
        .arg(format!("{}k", request.video_bitrate_kbps))
        .arg("-maxrate")
        .arg(format!("{}k", request.max_bitrate_kbps))
        .arg("-bufsize")
        .arg(format!("{}k", request.buffer_size_kbps))
        .arg("-preset")
        .arg(&settings.preset);

    cmd.arg("-c:a")
        .arg(&settings.audio_codec)
        .arg("-b:a")
        .arg(format!("{}k", request.audio_bitrate_kbps));

    if settings.faststart {
        cmd.arg("-movflags").arg("+faststart");
    }

    apply_additional_args(&mut cmd, &settings.extra_args);

    cmd.arg(&request.output_path);
    cmd
}

/// Format a command as a shell-safe string for display
pub fn format_ffmpeg_cmd(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|arg| {
            let s = arg.to_string_lossy();
            shlex::try_quote(&s)
                .map(|quoted| quoted.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("; ")
}

fn wait_with_timeout(child: &mut Child, limit: Duration) -> Result<ExitStatus> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("Failed to poll ffmpeg")? {
            return Ok(status);
        }
        if started.elapsed() >= limit {
            child.kill().ok();
            child.wait().ok();
            anyhow::bail!(
                "ffmpeg exceeded the {}s time limit and was killed",
                limit.as_secs()
            );
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run a command to completion, parsing `-progress` lines from stdout
///
/// Returns the exit status, the last progress snapshot and the captured stderr.
pub fn run_ffmpeg_once(
    mut cmd: Command,
    silent: bool,
    timeout: Option<Duration>,
) -> Result<(ExitStatus, ProgressParser, String)> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", cmd.get_program().to_string_lossy()))?;

    let stderr = child.stderr.take().context("Failed to capture stderr")?;
    let stderr_thread = thread::spawn(move || {
        let mut stderr_output = String::new();
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            stderr_output.push_str(&line);
            stderr_output.push('\n');
        }
        stderr_output
    });

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let progress_thread = thread::spawn(move || {
        let mut parser = ProgressParser::new();
        let mut printed = false;
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            parser.parse_line(&line);

            // One block of key=value lines ends with progress=continue|end
            if !silent && line.starts_with("progress=") {
                print!("\rEncoded: {:.1}s", parser.out_time_s());
                if let Some(size) = parser.total_size {
                    print!(" | Size: {:.2} MB", bytes_to_mb(size));
                }
                if let Some(speed) = parser.speed {
                    print!(" | Speed: {:.2}x", speed);
                }
                std::io::stdout().flush().ok();
                printed = true;
            }
        }
        if printed {
            println!();
        }
        parser
    });

    let status = match timeout {
        Some(limit) => wait_with_timeout(&mut child, limit)?,
        None => child.wait().context("Failed to wait for ffmpeg")?,
    };

    let parser = progress_thread.join().unwrap_or_default();
    let stderr_output = stderr_thread
        .join()
        .unwrap_or_else(|_| "Failed to capture stderr".to_string());

    Ok((status, parser, stderr_output))
}

/// [`MediaEncoder`] backed by the ffmpeg CLI
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    settings: EncoderSettings,
    silent: bool,
}

impl FfmpegEncoder {
    pub fn new(settings: EncoderSettings, silent: bool) -> Self {
        Self { settings, silent }
    }
}

impl MediaEncoder for FfmpegEncoder {
    fn encode(&self, request: &EncodeRequest) -> Result<()> {
        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create output directory")?;
            }
        }

        let cmd = build_encode_cmd(request, &self.settings);
        debug!(command = %format_ffmpeg_cmd(&cmd), "running encoder");

        let (status, parser, stderr) = run_ffmpeg_once(cmd, self.silent, self.settings.timeout())?;

        if !status.success() {
            anyhow::bail!("ffmpeg exited with {}: {}", status, stderr_tail(&stderr));
        }

        debug!(
            encoded_s = parser.out_time_s(),
            reported_size = ?parser.total_size,
            complete = parser.is_complete,
            "encoder finished"
        );
        Ok(())
    }
}
