use std::path::PathBuf;
use thiserror::Error;

/// Rejected planner inputs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("duration must be a positive number of seconds, got {0}")]
    NonPositiveDuration(f64),

    #[error("target size must be a positive number of MB, got {0}")]
    NonPositiveTarget(f64),

    #[error("overhead fraction must be in [0, 1), got {0}")]
    OverheadOutOfRange(f64),

    #[error("retry margin must be in (0, 1], got {0}")]
    RetryMarginOutOfRange(f64),

    #[error("'{field}' must be at least {min}, got {value}")]
    PolicyValueTooSmall {
        field: &'static str,
        min: f64,
        value: f64,
    },

    #[error("budget of {budget_kbits:.1} kbit over {duration_seconds:.2}s is below 1 kbps")]
    BudgetTooSmall {
        budget_kbits: f64,
        duration_seconds: f64,
    },
}

/// Fatal outcomes of a compression run
#[derive(Debug, Error)]
pub enum CompressError {
    #[error("input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("probe failed for {}: {message}", path.display())]
    ProbeFailed { path: PathBuf, message: String },

    #[error("output would overwrite the input: {}", path.display())]
    OutputIsInput { path: PathBuf },

    #[error("invalid input: {0}")]
    InvalidInput(#[from] PlanError),

    #[error("encode attempt {attempt} failed: {message}")]
    EncodeFailed { attempt: u32, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressError {
    pub fn probe_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProbeFailed {
            path: path.into(),
            message: message.into(),
        }
    }
}
