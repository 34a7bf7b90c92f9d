//! Index-grid generation for image sampling.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Generate the full grid of pixel indices for a 2D image shape.
///
/// Returns a tensor of shape `[H * W, 2]` with columns `(x, y)`, x varying
/// fastest, so that row `i` corresponds to element `i` of the row-major
/// flattened image.
pub fn sample_grid_2d<B: Backend>(shape: [usize; 2], device: &B::Device) -> Tensor<B, 2> {
    let (h, w) = (shape[0], shape[1]);
    let total = h * w;

    let mut grid = Vec::with_capacity(total * 2);
    for y in 0..h {
        for x in 0..w {
            grid.push(x as f32);
            grid.push(y as f32);
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * 2])), device)
        .reshape([total, 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn grid_order_matches_row_major_flattening() {
        let device = Default::default();
        let grid = sample_grid_2d::<B>([2, 3], &device);
        assert_eq!(grid.dims(), [6, 2]);

        let data = grid.into_data().to_vec::<f32>().unwrap();
        // Row 4 is pixel (y=1, x=1).
        assert_eq!(data[8], 1.0);
        assert_eq!(data[9], 1.0);
        // Row 2 is pixel (y=0, x=2).
        assert_eq!(data[4], 2.0);
        assert_eq!(data[5], 0.0);
    }
}
