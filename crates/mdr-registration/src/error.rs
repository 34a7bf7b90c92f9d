//! Error types for registration and the model-driven loop.

use thiserror::Error;

/// Main error type for model-driven registration.
#[derive(Error, Debug)]
pub enum MdrError {
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The frame stack does not match the signal model's acquisition.
    #[error("Frame count mismatch: the {model} model expects {expected} frames, the stack has {actual}")]
    FrameCountMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Two images that must share a grid have different shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, MdrError>;

impl MdrError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
