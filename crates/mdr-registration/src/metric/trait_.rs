//! The similarity metric trait.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use mdr_core::image::grid::sample_grid_2d;
use mdr_core::interpolation::{Interpolator, LinearInterpolator};
use mdr_core::transform::Transform;
use mdr_core::Image;

/// A differentiable similarity measure between a fixed image and a moving
/// image seen through a spatial transform.
///
/// The returned loss is a single-element tensor; lower is more similar.
/// Gradients with respect to the transform parameters flow through the
/// resampling step.
pub trait Metric<B: Backend> {
    /// Evaluate the loss for the given image pair and transform.
    fn forward(
        &self,
        fixed: &Image<B, 2>,
        moving: &Image<B, 2>,
        transform: &impl Transform<B, 2>,
    ) -> Tensor<B, 1>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}

/// Sample both images over the fixed grid.
///
/// Returns `(fixed_values, moving_values)`, each of shape `[H * W]` in
/// row-major pixel order. The moving image is sampled at the transformed
/// position of every fixed pixel.
pub(crate) fn sample_pair<B: Backend>(
    fixed: &Image<B, 2>,
    moving: &Image<B, 2>,
    transform: &impl Transform<B, 2>,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let [h, w] = fixed.shape();
    let device = fixed.data().device();

    let indices = sample_grid_2d::<B>([h, w], &device);
    let points = fixed.index_to_world_tensor(indices);
    let mapped = transform.transform_points(points);
    let sample_at = moving.world_to_index_tensor(mapped);

    let moving_values = LinearInterpolator::new().interpolate(moving.data(), sample_at);
    let fixed_values = fixed.data().clone().reshape([h * w]);
    (fixed_values, moving_values)
}
