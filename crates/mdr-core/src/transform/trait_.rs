//! Transform trait for spatial coordinate mappings.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps points from one physical space to another.
///
/// The trait deliberately does not require `burn::module::Module`, so both
/// trainable transforms and fixed ones can be used behind it.
pub trait Transform<B: Backend, const D: usize> {
    /// Apply the transform to a batch of physical points.
    ///
    /// `points` has shape `[N, D]`; the result has the same shape.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
