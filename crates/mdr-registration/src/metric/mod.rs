//! Image similarity metrics.

pub mod mse;
pub mod ncc;
pub mod trait_;

pub use mse::MeanSquaredError;
pub use ncc::NormalizedCrossCorrelation;
pub use trait_::Metric;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use mdr_core::transform::Transform;
use mdr_core::Image;
use serde::{Deserialize, Serialize};

/// Metric selection for a registration configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    /// [`MeanSquaredError`], the default for mono-modal series.
    MeanSquaredError,
    /// [`NormalizedCrossCorrelation`], robust to intensity rescaling.
    NormalizedCrossCorrelation,
}

impl MetricKind {
    /// Evaluate the selected metric.
    pub fn forward<B: Backend>(
        &self,
        fixed: &Image<B, 2>,
        moving: &Image<B, 2>,
        transform: &impl Transform<B, 2>,
    ) -> Tensor<B, 1> {
        match self {
            Self::MeanSquaredError => MeanSquaredError::new().forward(fixed, moving, transform),
            Self::NormalizedCrossCorrelation => {
                NormalizedCrossCorrelation::new().forward(fixed, moving, transform)
            }
        }
    }

    /// The name of the selected metric.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MeanSquaredError => "MeanSquaredError",
            Self::NormalizedCrossCorrelation => "NormalizedCrossCorrelation",
        }
    }
}
