//! Image resampling through a spatial transform.

use burn::tensor::backend::Backend;

use super::trait_::Transform;
use crate::image::grid::sample_grid_2d;
use crate::image::Image;
use crate::interpolation::{Interpolator, LinearInterpolator};

/// Resample `moving` through `transform`.
///
/// Every output pixel takes the value of `moving` at the transformed
/// position of that pixel, so the result lives on the same grid as the
/// input. The identity transform therefore reproduces the input (up to
/// interpolation error).
pub fn warp_image<B: Backend, T: Transform<B, 2>>(moving: &Image<B, 2>, transform: &T) -> Image<B, 2> {
    let [h, w] = moving.shape();
    let device = moving.data().device();

    let indices = sample_grid_2d::<B>([h, w], &device);
    let points = moving.index_to_world_tensor(indices);
    let mapped = transform.transform_points(points);
    let sample_at = moving.world_to_index_tensor(mapped);

    let values = LinearInterpolator::new().interpolate(moving.data(), sample_at);
    Image::new(values.reshape([h, w]), *moving.origin(), *moving.spacing())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Point2, Spacing2};
    use crate::transform::displacement_field::{DisplacementFieldTransform2D, FieldDomain};
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn identity_warp_reproduces_image() {
        let device = Default::default();
        let data = Tensor::<B, 2>::from_floats(
            [[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]],
            &device,
        );
        let image = Image::new(data.clone(), Point2::origin(), Spacing2::ones());

        let domain = FieldDomain::new(Point2::origin(), Spacing2::ones(), [3, 3]);
        let transform = DisplacementFieldTransform2D::<B>::identity(domain, [1.0, 1.0], &device);

        let warped = warp_image(&image, &transform);
        let diff = (warped.data().clone() - data).abs().max().into_scalar();
        assert!(diff < 1e-5);
    }
}
