//! Mean squared error metric.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use mdr_core::transform::Transform;
use mdr_core::Image;

use super::trait_::{sample_pair, Metric};

/// Mean squared intensity difference:
/// `MSE = (1/N) * sum((Fixed(x) - Moving(T(x)))^2)`.
///
/// The workhorse metric for mono-modal series, where the model fit and
/// the acquired frames share an intensity scale.
#[derive(Debug, Clone, Default)]
pub struct MeanSquaredError;

impl MeanSquaredError {
    /// Create a new MSE metric.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Metric<B> for MeanSquaredError {
    fn forward(
        &self,
        fixed: &Image<B, 2>,
        moving: &Image<B, 2>,
        transform: &impl Transform<B, 2>,
    ) -> Tensor<B, 1> {
        let (fixed_values, moving_values) = sample_pair(fixed, moving, transform);
        (moving_values - fixed_values).powf_scalar(2.0).mean()
    }

    fn name(&self) -> &'static str {
        "MeanSquaredError"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use mdr_core::spatial::{Point2, Spacing2};
    use mdr_core::transform::{DisplacementFieldTransform2D, FieldDomain};

    type B = NdArray<f32>;

    fn gradient_image(device: &<B as Backend>::Device) -> Image<B, 2> {
        let d = 6;
        let mut values = Vec::with_capacity(d * d);
        for y in 0..d {
            for x in 0..d {
                values.push((x + 2 * y) as f32);
            }
        }
        let data = Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([d, d]);
        Image::new(data, Point2::origin(), Spacing2::ones())
    }

    #[test]
    fn identical_images_score_zero() {
        let device = Default::default();
        let image = gradient_image(&device);
        let domain = FieldDomain::new(Point2::origin(), Spacing2::ones(), [6, 6]);
        let transform = DisplacementFieldTransform2D::<B>::identity(domain, [1.0, 1.0], &device);

        let loss: f32 = MeanSquaredError::new()
            .forward(&image, &image, &transform)
            .into_scalar();
        assert!(loss < 1e-6, "Identical images should score 0, got {}", loss);
    }

    #[test]
    fn intensity_offset_is_penalized() {
        let device = Default::default();
        let fixed = gradient_image(&device);
        let moving = Image::new(
            fixed.data().clone().add_scalar(3.0),
            Point2::origin(),
            Spacing2::ones(),
        );
        let domain = FieldDomain::new(Point2::origin(), Spacing2::ones(), [6, 6]);
        let transform = DisplacementFieldTransform2D::<B>::identity(domain, [1.0, 1.0], &device);

        let loss: f32 = MeanSquaredError::new()
            .forward(&fixed, &moving, &transform)
            .into_scalar();
        assert!((loss - 9.0).abs() < 1e-4);
    }
}
