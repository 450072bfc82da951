use crate::cli::{Cli, Commands};
use ffshrink::config::Config;
use ffshrink::engine::{
    self, AttemptRecord, CompressError, CompressReport, CompressStatus, EncodeRequest,
    FfmpegEncoder, FfprobeProber,
};
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber; `--verbose` wins over RUST_LOG
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ffshrink=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) {
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => apply_overrides(&cli, config),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    if let Some(command) = &cli.command {
        match command {
            Commands::CheckFfmpeg => handle_check_ffmpeg(&config),
            Commands::Probe { file } => handle_probe(&config, file),
            Commands::InitConfig => handle_init_config(),
        }
        return;
    }

    // clap enforces both paths when no subcommand is given
    let (Some(input), Some(output)) = (cli.input.as_deref(), cli.output.as_deref()) else {
        eprintln!("Error: --input and --output are required");
        process::exit(2);
    };

    if cli.dry_run {
        handle_dry_run(&config, input, output);
    } else {
        handle_compress(&config, input, output, cli.json);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Layer command-line flags over the loaded config
fn apply_overrides(cli: &Cli, mut config: Config) -> Config {
    if let Some(target) = cli.target_size_mb {
        config.defaults.target_size_mb = target;
    }
    if let Some(overhead) = cli.overhead_fraction {
        config.policy.overhead_fraction = overhead;
    }
    if let Some(margin) = cli.retry_margin {
        config.policy.retry_margin = margin;
    }
    if let Some(attempts) = cli.max_attempts {
        config.policy.max_attempts = attempts;
    }
    if let Some(timeout) = cli.encode_timeout_secs {
        config.encoder.timeout_secs = Some(timeout);
    }
    if let Some(extra) = &cli.extra_args {
        config.encoder.extra_args = extra.clone();
    }
    if cli.quiet || cli.json {
        config.defaults.quiet = true;
    }
    config
}

fn handle_check_ffmpeg(config: &Config) {
    let encoder = &config.encoder;
    match engine::ffmpeg_version(&encoder.ffmpeg_path) {
        Ok(version) => println!("ffmpeg found: {}", version),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
    match engine::ffprobe_version(&encoder.ffprobe_path) {
        Ok(version) => println!("ffprobe found: {}", version),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
    for codec in [&encoder.video_codec, &encoder.audio_codec] {
        if !engine::encoder_available(&encoder.ffmpeg_path, codec) {
            eprintln!("Error: ffmpeg has no '{}' encoder", codec);
            process::exit(1);
        }
    }
    println!(
        "Encoders available: {}, {}",
        encoder.video_codec, encoder.audio_codec
    );
}

fn handle_probe(config: &Config, file: &Path) {
    let prober = FfprobeProber::new(&config.encoder.ffprobe_path);
    match engine::probe_input(&prober, file) {
        Ok(info) => {
            println!("Duration: {:.2} seconds", info.duration_seconds);
            println!("Size: {:.2} MB ({} bytes)", info.size_mb(), info.size_bytes);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn handle_dry_run(config: &Config, input: &Path, output: &Path) {
    let prober = FfprobeProber::new(&config.encoder.ffprobe_path);
    let target = config.defaults.target_size_mb;

    let plan = engine::probe_input(&prober, input).and_then(|info| {
        config.policy.validate()?;
        let kbps = config.policy.initial_bitrate(target, info.duration_seconds)?;
        Ok((info, kbps))
    });

    match plan {
        Ok((info, kbps)) => {
            print_source_summary(info.size_mb(), info.duration_seconds, target);
            println!("Planned video bitrate: {} kbps", kbps);

            let request = EncodeRequest::new(
                input,
                output,
                kbps,
                config.policy.first_audio_bitrate_kbps,
                &config.policy,
            );
            let cmd = engine::build_encode_cmd(&request, &config.encoder);
            println!("{}", engine::format_ffmpeg_cmd(&cmd));
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn handle_compress(config: &Config, input: &Path, output: &Path, json: bool) {
    let prober = FfprobeProber::new(&config.encoder.ffprobe_path);
    let encoder = FfmpegEncoder::new(config.encoder.clone(), config.defaults.quiet);
    let target = config.defaults.target_size_mb;

    if !json {
        println!("Compressing {} to at most {} MB", input.display(), target);
    }

    let result = engine::compress_to_target_with_callback(
        &prober,
        &encoder,
        &config.policy,
        input,
        output,
        target,
        |record| {
            if !json {
                print_attempt(record, target);
            }
        },
    );

    match &result {
        Ok(report) if json => match report_json(report) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error: failed to serialize report: {}", e),
        },
        Ok(report) => print_report(report),
        Err(e) => {
            if matches!(e, CompressError::EncodeFailed { .. }) {
                eprintln!("Compression failed!");
            }
            eprintln!("Error: {}", e);
        }
    }

    let code = exit_code(&result);
    if code != 0 {
        process::exit(code);
    }
}

/// Process exit status for a compression run
fn exit_code(result: &Result<CompressReport, CompressError>) -> i32 {
    match result {
        // A missed target still leaves a usable output behind
        Ok(report) => match report.status {
            CompressStatus::Done | CompressStatus::TargetMissed => 0,
        },
        Err(_) => 1,
    }
}

/// The report plus derived figures, pretty-printed
fn report_json(report: &CompressReport) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(report)?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "final_size_mb".to_string(),
            serde_json::json!(report.final_size_mb()),
        );
        map.insert(
            "compression_pct".to_string(),
            serde_json::json!(report.compression_pct()),
        );
    }
    serde_json::to_string_pretty(&value)
}

fn print_source_summary(size_mb: f64, duration_seconds: f64, target_mb: f64) {
    println!("Original size: {:.2} MB", size_mb);
    println!("Duration: {:.2} seconds", duration_seconds);
    println!("Target size: {} MB", target_mb);
}

fn print_attempt(record: &AttemptRecord, target_mb: f64) {
    println!(
        "\nAttempt {}: video {} kbps, audio {} kbps",
        record.attempt, record.video_bitrate_kbps, record.audio_bitrate_kbps
    );
    match record.outcome.output_size_mb() {
        Some(mb) if mb > target_mb => println!(
            "Output size: {:.2} MB (over the {} MB target)",
            mb, target_mb
        ),
        Some(mb) => println!("Output size: {:.2} MB", mb),
        None => println!(
            "Encode failed: {}",
            record.outcome.failure.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn print_report(report: &CompressReport) {
    println!();
    print_source_summary(
        report.source.size_mb(),
        report.source.duration_seconds,
        report.target_size_mb,
    );
    println!("Planned video bitrate: {} kbps", report.initial_bitrate_kbps);
    match report.status {
        CompressStatus::Done => println!("Compression complete!"),
        CompressStatus::TargetMissed => println!(
            "Warning: output ({:.2} MB) is still larger than the target ({} MB)",
            report.final_size_mb(),
            report.target_size_mb
        ),
    }
    println!("Final size: {:.2} MB", report.final_size_mb());
    if let Some(pct) = report.compression_pct() {
        println!("Compression: {:.1}%", pct);
    }
    println!("\nCompressed video saved to: {}", report.output_path.display());
    println!("If the result looks good, replace the original with:");
    println!("  {}", replace_command(&report.output_path, &report.input_path));
}

/// `mv <output> <input>`, shell-quoted
fn replace_command(output: &Path, input: &Path) -> String {
    let quote = |p: &Path| -> String {
        let s = p.to_string_lossy();
        shlex::try_quote(&s)
            .map(|q| q.into_owned())
            .unwrap_or_else(|_| s.into_owned())
    };
    format!("mv {} {}", quote(output), quote(input))
}

fn handle_init_config() {
    let path = match Config::config_path() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    if path.exists() {
        match Config::load_from(&path) {
            Ok(cfg) => {
                println!("Config loaded successfully from {}", path.display());
                println!("{:#?}", cfg);
            }
            Err(e) => {
                eprintln!("Config at {} is invalid: {:#}", path.display(), e);
                process::exit(1);
            }
        }
        return;
    }

    println!("No config found, creating default config...");
    match Config::default().save() {
        Ok(saved) => println!("Default config saved to {}", saved.display()),
        Err(e) => {
            eprintln!("Failed to save default config: {:#}", e);
            process::exit(1);
        }
    }
}
