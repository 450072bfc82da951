// Size-feedback retry controller: probe, plan, encode, measure, correct

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::error::CompressError;
use super::ffmpeg_cmd::MediaEncoder;
use super::planner::RatePolicy;
use super::types::{
    AttemptRecord, CompressReport, CompressStatus, EncodeOutcome, EncodeRequest, MediaInfo,
    RetryDecision,
};
use crate::engine::probe::MediaProber;

/// Where an attempt's output waits while the next attempt writes to the final path
///
/// `<stem>.attempt<N>.temp.<ext>` next to the output.
pub fn temp_artifact_path(output: &Path, attempt: u32) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match output.extension() {
        Some(ext) => format!("{}.attempt{}.temp.{}", stem, attempt, ext.to_string_lossy()),
        None => format!("{}.attempt{}.temp", stem, attempt),
    };
    output.with_file_name(name)
}

/// A previous attempt's output, moved aside while the next attempt runs
///
/// Exactly one of `discard` or `restore` should be called. If neither is
/// (early return, panic), drop puts the file back at the output path. When
/// the file cannot be moved back it stays at its temporary path and the path
/// is logged; a usable output is never deleted here.
#[derive(Debug)]
pub struct HeldArtifact {
    temp_path: PathBuf,
    output_path: PathBuf,
    size_bytes: u64,
    attempt: u32,
    armed: bool,
}

impl HeldArtifact {
    /// Rename `output` to its temporary path
    pub fn set_aside(output: &Path, attempt: u32, size_bytes: u64) -> Result<Self, CompressError> {
        let temp_path = temp_artifact_path(output, attempt);
        fs::rename(output, &temp_path)?;
        debug!(from = %output.display(), to = %temp_path.display(), "moved attempt output aside");

        Ok(Self {
            temp_path,
            output_path: output.to_path_buf(),
            size_bytes,
            attempt,
            armed: true,
        })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// A newer attempt succeeded; this one is no longer needed
    pub fn discard(mut self) -> Result<(), CompressError> {
        self.armed = false;
        fs::remove_file(&self.temp_path)?;
        debug!(path = %self.temp_path.display(), "removed superseded attempt output");
        Ok(())
    }

    /// The newer attempt failed; put this output back in place
    ///
    /// On error the file is left at [`HeldArtifact::temp_path`].
    pub fn restore(mut self) -> Result<(), CompressError> {
        self.armed = false;
        if let Err(e) = Self::move_back(&self.temp_path, &self.output_path) {
            warn!(
                error = %e,
                kept = %self.temp_path.display(),
                "could not restore earlier attempt output"
            );
            return Err(e.into());
        }
        info!(
            attempt = self.attempt,
            path = %self.output_path.display(),
            "restored earlier attempt output"
        );
        Ok(())
    }

    fn move_back(temp_path: &Path, output_path: &Path) -> std::io::Result<()> {
        // A failed encoder may have left a partial file behind
        if output_path.exists() {
            fs::remove_file(output_path)?;
        }
        fs::rename(temp_path, output_path)
    }
}

impl Drop for HeldArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = Self::move_back(&self.temp_path, &self.output_path) {
            warn!(
                error = %e,
                kept = %self.temp_path.display(),
                "could not restore held output, leaving it in place"
            );
        }
    }
}

/// Run one encode attempt and measure what it produced
///
/// The output is only measured when the encoder reports success.
pub fn run_attempt<E>(encoder: &E, request: &EncodeRequest) -> EncodeOutcome
where
    E: MediaEncoder + ?Sized,
{
    match encoder.encode(request) {
        Ok(()) => match fs::metadata(&request.output_path) {
            Ok(meta) => EncodeOutcome::succeeded(meta.len()),
            Err(e) => EncodeOutcome::failed(format!(
                "encoder reported success but {} is unreadable: {}",
                request.output_path.display(),
                e
            )),
        },
        Err(e) => EncodeOutcome::failed(format!("{:#}", e)),
    }
}

fn ensure_distinct_paths(input: &Path, output: &Path) -> Result<(), CompressError> {
    let same = match (fs::canonicalize(input), fs::canonicalize(output)) {
        (Ok(a), Ok(b)) => a == b,
        _ => input == output,
    };
    if same {
        return Err(CompressError::OutputIsInput {
            path: output.to_path_buf(),
        });
    }
    Ok(())
}

fn remove_partial_output(output: &Path) {
    if !output.exists() {
        return;
    }
    match fs::remove_file(output) {
        Ok(()) => debug!(path = %output.display(), "removed partial output"),
        Err(e) => warn!(error = %e, path = %output.display(), "could not remove partial output"),
    }
}

/// Probe the input and reject anything without a usable duration
pub fn probe_input<P>(prober: &P, input: &Path) -> Result<MediaInfo, CompressError>
where
    P: MediaProber + ?Sized,
{
    if !input.exists() {
        return Err(CompressError::InputNotFound {
            path: input.to_path_buf(),
        });
    }

    let info = prober
        .probe(input)
        .map_err(|e| CompressError::probe_failed(input, format!("{:#}", e)))?;

    if !(info.duration_seconds > 0.0) || !info.duration_seconds.is_finite() {
        return Err(CompressError::probe_failed(
            input,
            format!("non-positive duration {}", info.duration_seconds),
        ));
    }

    Ok(info)
}

/// Compress `input` into `output` so it fits in `target_size_mb`
///
/// See [`compress_to_target_with_callback`]; this variant reports nothing
/// while running.
pub fn compress_to_target<P, E>(
    prober: &P,
    encoder: &E,
    policy: &RatePolicy,
    input: &Path,
    output: &Path,
    target_size_mb: f64,
) -> Result<CompressReport, CompressError>
where
    P: MediaProber + ?Sized,
    E: MediaEncoder + ?Sized,
{
    compress_to_target_with_callback(
        prober,
        encoder,
        policy,
        input,
        output,
        target_size_mb,
        |_| {},
    )
}

/// Compress with a callback invoked after every attempt
///
/// Every attempt encodes from the original input. An overshooting attempt is
/// moved aside and retried at the corrected bitrate, up to
/// `policy.max_attempts` attempts in total. A superseded output is only
/// deleted once a newer attempt succeeds; if a later attempt fails, the
/// earlier output is restored and the run ends as
/// [`CompressStatus::TargetMissed`]. A failure on the first attempt is fatal
/// and whatever partial file the encoder left at `output` is removed.
pub fn compress_to_target_with_callback<P, E, F>(
    prober: &P,
    encoder: &E,
    policy: &RatePolicy,
    input: &Path,
    output: &Path,
    target_size_mb: f64,
    mut on_attempt: F,
) -> Result<CompressReport, CompressError>
where
    P: MediaProber + ?Sized,
    E: MediaEncoder + ?Sized,
    F: FnMut(&AttemptRecord),
{
    policy.validate()?;
    let source = probe_input(prober, input)?;
    ensure_distinct_paths(input, output)?;

    let initial_bitrate_kbps = policy.initial_bitrate(target_size_mb, source.duration_seconds)?;
    info!(
        duration_s = source.duration_seconds,
        source_bytes = source.size_bytes,
        target_mb = target_size_mb,
        video_kbps = initial_bitrate_kbps,
        "planned initial bitrate"
    );

    let mut attempts: Vec<AttemptRecord> = Vec::new();
    let mut held: Option<HeldArtifact> = None;
    let mut video_bitrate_kbps = initial_bitrate_kbps;
    let mut audio_bitrate_kbps = policy.first_audio_bitrate_kbps;
    let mut attempt: u32 = 1;

    let finish = |status, final_size_bytes, attempts| CompressReport {
        input_path: input.to_path_buf(),
        output_path: output.to_path_buf(),
        status,
        source,
        target_size_mb,
        initial_bitrate_kbps,
        attempts,
        final_size_bytes,
        finished_at: Utc::now(),
    };

    loop {
        let request = EncodeRequest::new(
            input,
            output,
            video_bitrate_kbps,
            audio_bitrate_kbps,
            policy,
        );
        debug!(attempt, ?request, "starting encode attempt");

        let outcome = run_attempt(encoder, &request);
        let record = AttemptRecord {
            attempt,
            video_bitrate_kbps,
            audio_bitrate_kbps,
            outcome: outcome.clone(),
        };
        on_attempt(&record);
        attempts.push(record);

        match policy.decide_retry(&outcome, target_size_mb, video_bitrate_kbps) {
            RetryDecision::Abort => {
                let message = outcome
                    .failure
                    .unwrap_or_else(|| "encoder failed".to_string());
                warn!(attempt, %message, "encode attempt failed");

                return match held.take() {
                    Some(previous) => {
                        let size = previous.size_bytes();
                        previous.restore()?;
                        Ok(finish(CompressStatus::TargetMissed, size, attempts))
                    }
                    None => {
                        remove_partial_output(output);
                        Err(CompressError::EncodeFailed { attempt, message })
                    }
                };
            }
            RetryDecision::Done => {
                if let Some(previous) = held.take() {
                    previous.discard()?;
                }
                let size = outcome.output_size_bytes.unwrap_or_default();
                info!(attempt, size_bytes = size, "output fits target");
                return Ok(finish(CompressStatus::Done, size, attempts));
            }
            RetryDecision::RetryWith {
                video_bitrate_kbps: corrected,
            } => {
                let size = outcome.output_size_bytes.unwrap_or_default();

                if let Some(previous) = held.take() {
                    previous.discard()?;
                }

                if attempt >= policy.max_attempts || corrected == 0 {
                    warn!(
                        attempt,
                        size_bytes = size,
                        target_mb = target_size_mb,
                        "output still over target, no attempts left"
                    );
                    return Ok(finish(CompressStatus::TargetMissed, size, attempts));
                }

                info!(
                    attempt,
                    size_bytes = size,
                    next_video_kbps = corrected,
                    "output over target, retrying"
                );
                held = Some(HeldArtifact::set_aside(output, attempt, size)?);
                video_bitrate_kbps = corrected;
                audio_bitrate_kbps = policy.retry_audio_bitrate_kbps;
                attempt += 1;
            }
        }
    }
}
