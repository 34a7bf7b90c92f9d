//! Time series of 2D image frames sharing one spatial grid.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::Image;
use crate::spatial::{Point2, Spacing2};

/// An ordered sequence of 2D frames acquired over varying sequence
/// parameters (b-values, inversion times, echo times, ...).
///
/// All frames share the same spatial shape, origin and pixel spacing;
/// the frame axis is the slowest tensor axis, so `frames` has shape
/// `[T, H, W]`.
#[derive(Debug, Clone)]
pub struct ImageStack<B: Backend> {
    frames: Tensor<B, 3>,
    origin: Point2,
    spacing: Spacing2,
}

impl<B: Backend> ImageStack<B> {
    /// Create a stack from a `[T, H, W]` tensor.
    ///
    /// # Panics
    /// Panics if the tensor holds no frames or a degenerate spatial shape.
    pub fn new(frames: Tensor<B, 3>, origin: Point2, spacing: Spacing2) -> Self {
        let [t, h, w] = frames.dims();
        assert!(t > 0, "An image stack needs at least one frame");
        assert!(h > 1 && w > 1, "Frames must be at least 2x2, got {}x{}", h, w);
        Self {
            frames,
            origin,
            spacing,
        }
    }

    /// Stack individual `[H, W]` frames along a new leading axis.
    pub fn from_frames(frames: Vec<Tensor<B, 2>>, origin: Point2, spacing: Spacing2) -> Self {
        assert!(!frames.is_empty(), "An image stack needs at least one frame");
        let stacked = Tensor::stack(frames, 0);
        Self::new(stacked, origin, spacing)
    }

    /// Build a stack from row-major `[T, H, W]` pixel values.
    pub fn from_vec(
        values: Vec<f32>,
        shape: [usize; 3],
        origin: Point2,
        spacing: Spacing2,
        device: &B::Device,
    ) -> Self {
        let [t, h, w] = shape;
        assert_eq!(values.len(), t * h * w, "Value count must match shape");
        let frames = Tensor::<B, 1>::from_data(TensorData::new(values, Shape::new([t * h * w])), device)
            .reshape([t, h, w]);
        Self::new(frames, origin, spacing)
    }

    /// Number of frames in the stack.
    pub fn num_frames(&self) -> usize {
        self.frames.dims()[0]
    }

    /// Spatial shape `[H, W]` shared by every frame.
    pub fn frame_shape(&self) -> [usize; 2] {
        let [_, h, w] = self.frames.dims();
        [h, w]
    }

    /// Number of pixels per frame.
    pub fn num_pixels(&self) -> usize {
        let [h, w] = self.frame_shape();
        h * w
    }

    /// The underlying `[T, H, W]` tensor.
    pub fn frames(&self) -> &Tensor<B, 3> {
        &self.frames
    }

    /// Physical coordinate of pixel (0, 0).
    pub fn origin(&self) -> &Point2 {
        &self.origin
    }

    /// Pixel spacing shared by every frame.
    pub fn spacing(&self) -> &Spacing2 {
        &self.spacing
    }

    /// Extract frame `t` as a standalone [`Image`].
    ///
    /// # Panics
    /// Panics if `t` is out of range.
    pub fn frame(&self, t: usize) -> Image<B, 2> {
        let [num, h, w] = self.frames.dims();
        assert!(t < num, "Frame index {} out of range ({} frames)", t, num);
        let data = self
            .frames
            .clone()
            .slice([t..t + 1, 0..h, 0..w])
            .reshape([h, w]);
        Image::new(data, self.origin, self.spacing)
    }

    /// A stack with the same grid but new frame data.
    pub fn with_frames(&self, frames: Tensor<B, 3>) -> Self {
        assert_eq!(
            frames.dims(),
            self.frames.dims(),
            "Replacement frames must keep the stack shape"
        );
        Self::new(frames, self.origin, self.spacing)
    }

    /// Pixel values as a row-major `[T, H, W]` vector.
    pub fn to_vec(&self) -> Vec<f32> {
        self.frames.clone().into_data().iter::<f32>().collect()
    }
}
