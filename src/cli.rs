use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ffshrink", version)]
#[command(about = "Shrink a video below a target size with ffmpeg", long_about = None)]
#[command(subcommand_negates_reqs = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Video to compress
    #[arg(short, long, value_name = "PATH", required = true)]
    pub input: Option<PathBuf>,

    /// Where to write the compressed video
    #[arg(short, long, value_name = "PATH", required = true)]
    pub output: Option<PathBuf>,

    /// Maximum output size in MB [default: 100, or the config file value]
    #[arg(long, value_name = "MB")]
    pub target_size_mb: Option<f64>,

    /// Share of the size budget reserved for audio and container overhead [default: 0.10]
    #[arg(long, value_name = "F")]
    pub overhead_fraction: Option<f64>,

    /// Extra factor applied to the corrected bitrate on retry [default: 0.85]
    #[arg(long, value_name = "F")]
    pub retry_margin: Option<f64>,

    /// Total encode attempts, including the first [default: 2]
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Kill ffmpeg and fail the attempt after this many seconds
    #[arg(long, value_name = "SECS")]
    pub encode_timeout_secs: Option<u64>,

    /// Additional ffmpeg arguments, inserted before the output path
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub extra_args: Option<String>,

    /// Read settings from this file instead of the default config location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the planned bitrate and ffmpeg command without encoding
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Hide ffmpeg progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Probe a video file for its duration and size
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
