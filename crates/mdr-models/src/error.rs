//! Error types for per-pixel model fitting.

use thiserror::Error;

/// Failure of a single pixel's fit.
///
/// These errors never abort a whole-image fit; callers convert them into
/// flagged passthrough results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FitError {
    /// The model or residuals produced NaN or infinite values.
    #[error("fit produced non-finite values")]
    NonFinite,

    /// The normal equations could not be solved.
    #[error("normal equations are singular")]
    Singular,

    /// The pixel series carries no usable signal.
    #[error("signal series is degenerate")]
    DegenerateSignal,
}
