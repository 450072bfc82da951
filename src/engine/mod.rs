// Bitrate planning and encode orchestration, independent of the CLI

pub mod core;
pub mod probe;

pub use core::*;
pub use probe::{FfprobeProber, MediaProber, parse_probe_report};
