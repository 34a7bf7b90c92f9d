//! Interpolator trait for sampling images at continuous indices.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Samples a 2D image at a batch of continuous indices.
///
/// Implementations must be differentiable with respect to `indices` so
/// that registration losses can be optimized through the sampling step.
pub trait Interpolator<B: Backend> {
    /// Sample `data` (shape `[H, W]`) at `indices` (shape `[N, 2]`, columns
    /// `(x, y)`), returning one value per index row.
    ///
    /// Indices outside the image are clamped to the border.
    fn interpolate(&self, data: &Tensor<B, 2>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}
