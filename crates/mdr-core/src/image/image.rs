//! Image type with physical metadata and coordinate transformations.
//!
//! An [`Image`] couples tensor pixel data with the physical-space metadata
//! (origin and spacing) that maps pixel indices to physical coordinates.
//! Image axes are assumed to be aligned with the physical axes; oblique
//! acquisitions are resampled upstream by the data loader.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use crate::spatial::{Point, Spacing};

/// A D-dimensional image with physical metadata.
///
/// # Coordinate systems
/// * **Index space**: continuous pixel indices, `(x, y, ...)` with x along
///   the fastest-varying (last) tensor axis.
/// * **Physical space**: continuous coordinates in mm,
///   `point = origin + index * spacing`.
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    origin: Point<D>,
    spacing: Spacing<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image from pixel data and physical metadata.
    pub fn new(data: Tensor<B, D>, origin: Point<D>, spacing: Spacing<D>) -> Self {
        Self {
            data,
            origin,
            spacing,
        }
    }

    /// The pixel data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Physical coordinate of the pixel at index zero.
    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    /// Physical distance between pixel centres.
    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    /// The image shape, slowest axis first.
    pub fn shape(&self) -> [usize; D] {
        self.data
            .shape()
            .dims
            .try_into()
            .expect("Tensor rank matches image dimensionality")
    }

    /// Batch transform continuous indices to physical points.
    ///
    /// `indices` has shape `[N, D]` with columns in `(x, y, ...)` order;
    /// the result has the same shape and ordering.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        let scaled = indices * self.spacing_row(&device);
        scaled + self.origin_row(&device)
    }

    /// Batch transform physical points to continuous indices.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let centred = points - self.origin_row(&device);
        centred / self.spacing_row(&device)
    }

    fn origin_row(&self, device: &B::Device) -> Tensor<B, 2> {
        let coords: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(coords, Shape::new([D])), device).reshape([1, D])
    }

    fn spacing_row(&self, device: &B::Device) -> Tensor<B, 2> {
        let scale: Vec<f32> = (0..D).map(|i| self.spacing[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(scale, Shape::new([D])), device).reshape([1, D])
    }
}
