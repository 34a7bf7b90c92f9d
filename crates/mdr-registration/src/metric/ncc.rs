//! Normalized cross correlation metric.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use mdr_core::transform::Transform;
use mdr_core::Image;

use super::trait_::{sample_pair, Metric};

/// Normalized cross correlation loss, `1 - NCC`.
///
/// Invariant to affine intensity rescaling of either image, which makes
/// it robust when the model fit and the acquired frames differ by gain or
/// offset. The loss lies in `[0, 2]` with 0 for perfectly correlated
/// images.
#[derive(Debug, Clone, Default)]
pub struct NormalizedCrossCorrelation;

impl NormalizedCrossCorrelation {
    /// Create a new NCC metric.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Metric<B> for NormalizedCrossCorrelation {
    fn forward(
        &self,
        fixed: &Image<B, 2>,
        moving: &Image<B, 2>,
        transform: &impl Transform<B, 2>,
    ) -> Tensor<B, 1> {
        let (fixed_values, moving_values) = sample_pair(fixed, moving, transform);

        let f = fixed_values.clone() - fixed_values.mean();
        let m = moving_values.clone() - moving_values.mean();

        let numerator = (f.clone() * m.clone()).sum();
        let denominator = (f.powf_scalar(2.0).sum() * m.powf_scalar(2.0).sum())
            .sqrt()
            .add_scalar(1e-12);

        (numerator / denominator).neg().add_scalar(1.0)
    }

    fn name(&self) -> &'static str {
        "NormalizedCrossCorrelation"
    }
}
