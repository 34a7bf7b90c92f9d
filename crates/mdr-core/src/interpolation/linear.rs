//! Bilinear interpolation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::trait_::Interpolator;

/// Bilinear interpolator for 2D images.
///
/// Implemented with flat gathers so the sampling remains differentiable
/// with respect to both the image values and the sampling positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new bilinear interpolator.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 2>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [h, w] = data.dims();
        let n = indices.dims()[0];
        let device = indices.device();

        // indices: [N, 2] -> (x, y)
        let x = indices.clone().narrow(1, 0, 1).squeeze::<1>(1);
        let y = indices.narrow(1, 1, 1).squeeze::<1>(1);

        let x0 = x.clone().floor();
        let y0 = y.clone().floor();

        let wx = x - x0.clone();
        let wy = y - y0.clone();

        let x1 = x0.clone() + 1.0;
        let y1 = y0.clone() + 1.0;

        // Border clamp; gradient flows through the weights, not the gathers.
        let x0_i = x0.clamp(0.0, (w - 1) as f64).int();
        let y0_i = y0.clamp(0.0, (h - 1) as f64).int();
        let x1_i = x1.clamp(0.0, (w - 1) as f64).int();
        let y1_i = y1.clamp(0.0, (h - 1) as f64).int();

        let stride_y = w as i32;
        let flat = data.clone().reshape([h * w]);

        let v00 = gather(&flat, &x0_i, &y0_i, stride_y);
        let v01 = gather(&flat, &x0_i, &y1_i, stride_y);
        let v10 = gather(&flat, &x1_i, &y0_i, stride_y);
        let v11 = gather(&flat, &x1_i, &y1_i, stride_y);

        let one = Tensor::<B, 1>::ones([n], &device);
        let one_minus_wx = one.clone() - wx.clone();
        let one_minus_wy = one - wy.clone();

        let c0 = v00 * one_minus_wx.clone() + v10 * wx.clone();
        let c1 = v01 * one_minus_wx + v11 * wx;

        c0 * one_minus_wy + c1 * wy
    }
}

#[inline]
fn gather<B: Backend>(
    flat: &Tensor<B, 1>,
    xi: &Tensor<B, 1, Int>,
    yi: &Tensor<B, 1, Int>,
    stride_y: i32,
) -> Tensor<B, 1> {
    let idx = yi.clone() * stride_y + xi.clone();
    flat.clone().gather(0, idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn values(t: Tensor<B, 1>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn exact_at_integer_indices() {
        let device = Default::default();
        let data = Tensor::<B, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);
        let indices =
            Tensor::<B, 2>::from_floats([[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], &device);

        let out = values(LinearInterpolator::new().interpolate(&data, indices));
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn midpoint_averages_neighbours() {
        let device = Default::default();
        let data = Tensor::<B, 2>::from_floats([[0.0, 2.0], [4.0, 6.0]], &device);
        let indices = Tensor::<B, 2>::from_floats([[0.5, 0.5]], &device);

        let out = values(LinearInterpolator::new().interpolate(&data, indices));
        assert!((out[0] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn clamps_outside_samples_to_border() {
        let device = Default::default();
        let data = Tensor::<B, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);
        let indices = Tensor::<B, 2>::from_floats([[-1.0, -1.0], [5.0, 5.0]], &device);

        let out = values(LinearInterpolator::new().interpolate(&data, indices));
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 4.0);
    }
}
