// Target-bitrate estimation and the size-feedback retry rule

use serde::{Deserialize, Serialize};

use super::error::PlanError;
use super::types::{EncodeOutcome, RetryDecision};

pub const DEFAULT_OVERHEAD_FRACTION: f64 = 0.10;
pub const DEFAULT_RETRY_MARGIN: f64 = 0.85;
pub const DEFAULT_MAX_BITRATE_FACTOR: f64 = 1.2;
pub const DEFAULT_BUFFER_SIZE_FACTOR: f64 = 2.0;
pub const DEFAULT_FIRST_AUDIO_BITRATE_KBPS: u32 = 128;
pub const DEFAULT_RETRY_AUDIO_BITRATE_KBPS: u32 = 96;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Kilobits per megabyte of target size
const KBITS_PER_MB: f64 = 8.0 * 1024.0;

/// Tunable constants of the bitrate plan and retry loop
///
/// The defaults are empirical and tuned for H.264/AAC in MP4; other codecs or
/// content may want different values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatePolicy {
    /// Share of the budget reserved for audio and container overhead
    pub overhead_fraction: f64,

    /// Extra factor applied on top of the proportional correction when retrying
    pub retry_margin: f64,

    /// `-maxrate` as a multiple of the video bitrate
    pub max_bitrate_factor: f64,

    /// `-bufsize` as a multiple of the video bitrate
    pub buffer_size_factor: f64,

    pub first_audio_bitrate_kbps: u32,
    pub retry_audio_bitrate_kbps: u32,

    /// Total encode attempts including the first one
    pub max_attempts: u32,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            overhead_fraction: DEFAULT_OVERHEAD_FRACTION,
            retry_margin: DEFAULT_RETRY_MARGIN,
            max_bitrate_factor: DEFAULT_MAX_BITRATE_FACTOR,
            buffer_size_factor: DEFAULT_BUFFER_SIZE_FACTOR,
            first_audio_bitrate_kbps: DEFAULT_FIRST_AUDIO_BITRATE_KBPS,
            retry_audio_bitrate_kbps: DEFAULT_RETRY_AUDIO_BITRATE_KBPS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RatePolicy {
    /// Reject values that would break the non-increasing bitrate invariant
    /// or produce a meaningless plan
    pub fn validate(&self) -> Result<(), PlanError> {
        if !(0.0..1.0).contains(&self.overhead_fraction) {
            return Err(PlanError::OverheadOutOfRange(self.overhead_fraction));
        }
        if !(self.retry_margin > 0.0 && self.retry_margin <= 1.0) {
            return Err(PlanError::RetryMarginOutOfRange(self.retry_margin));
        }
        let minimums = [
            ("max_bitrate_factor", 1.0, self.max_bitrate_factor),
            ("buffer_size_factor", 1.0, self.buffer_size_factor),
            ("max_attempts", 1.0, self.max_attempts as f64),
            ("first_audio_bitrate_kbps", 1.0, self.first_audio_bitrate_kbps as f64),
            ("retry_audio_bitrate_kbps", 1.0, self.retry_audio_bitrate_kbps as f64),
        ];
        for (field, min, value) in minimums {
            if !(value >= min) {
                return Err(PlanError::PolicyValueTooSmall { field, min, value });
            }
        }
        Ok(())
    }

    pub fn initial_bitrate(
        &self,
        target_size_mb: f64,
        duration_seconds: f64,
    ) -> Result<u32, PlanError> {
        plan_initial_bitrate(target_size_mb, duration_seconds, self.overhead_fraction)
    }

    pub fn decide_retry(
        &self,
        outcome: &EncodeOutcome,
        target_size_mb: f64,
        current_bitrate_kbps: u32,
    ) -> RetryDecision {
        decide_retry(outcome, target_size_mb, current_bitrate_kbps, self.retry_margin)
    }
}

/// Video bitrate (kbps) that spends `1 - overhead_fraction` of the target size
/// over the whole duration, truncated to an integer
pub fn plan_initial_bitrate(
    target_size_mb: f64,
    duration_seconds: f64,
    overhead_fraction: f64,
) -> Result<u32, PlanError> {
    // Written as negated comparisons so NaN is rejected as well
    if !(duration_seconds > 0.0) || !duration_seconds.is_finite() {
        return Err(PlanError::NonPositiveDuration(duration_seconds));
    }
    if !(target_size_mb > 0.0) || !target_size_mb.is_finite() {
        return Err(PlanError::NonPositiveTarget(target_size_mb));
    }
    if !(0.0..1.0).contains(&overhead_fraction) {
        return Err(PlanError::OverheadOutOfRange(overhead_fraction));
    }

    let budget_kbits = target_size_mb * KBITS_PER_MB * (1.0 - overhead_fraction);
    let kbps = (budget_kbits / duration_seconds).trunc();

    if kbps < 1.0 {
        return Err(PlanError::BudgetTooSmall {
            budget_kbits,
            duration_seconds,
        });
    }

    Ok(kbps.min(u32::MAX as f64) as u32)
}

/// Decide the next step after an attempt
///
/// Failure aborts, a fitting output is done, and an overshoot scales the
/// bitrate by `retry_margin * target / output`.
pub fn decide_retry(
    outcome: &EncodeOutcome,
    target_size_mb: f64,
    current_bitrate_kbps: u32,
    retry_margin: f64,
) -> RetryDecision {
    let output_mb = match (outcome.success, outcome.output_size_mb()) {
        (true, Some(mb)) => mb,
        _ => return RetryDecision::Abort,
    };

    if output_mb <= target_size_mb {
        return RetryDecision::Done;
    }

    let corrected = current_bitrate_kbps as f64 * retry_margin * (target_size_mb / output_mb);
    let corrected = corrected.floor().max(0.0) as u32;
    // Clamp keeps the bitrate strictly decreasing even with float noise near 1.0
    let video_bitrate_kbps = corrected.min(current_bitrate_kbps.saturating_sub(1));

    RetryDecision::RetryWith { video_bitrate_kbps }
}
