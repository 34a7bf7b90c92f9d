//! Dense displacement field transform on a control-point grid.
//!
//! The transform stores one displacement vector (in mm) per control point.
//! Control points live on a regular grid over the image; a control spacing
//! of one pixel gives a fully dense field, coarser spacings give a
//! free-form deformation with bilinear basis functions. Displacements at
//! arbitrary positions are obtained by interpolating the control grid, so
//! the mapping stays differentiable with respect to the control points.

use burn::module::{Ignored, Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::trait_::Transform;
use crate::image::grid::sample_grid_2d;
use crate::interpolation::{Interpolator, LinearInterpolator};
use crate::spatial::{Point2, Spacing2};

/// The spatial grid a displacement field is defined on.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDomain {
    /// Physical coordinate of pixel (0, 0).
    pub origin: Point2,
    /// Pixel spacing in mm.
    pub spacing: Spacing2,
    /// Full-resolution spatial shape `[H, W]`.
    pub shape: [usize; 2],
}

impl FieldDomain {
    /// Create a field domain for an image grid.
    pub fn new(origin: Point2, spacing: Spacing2, shape: [usize; 2]) -> Self {
        Self {
            origin,
            spacing,
            shape,
        }
    }

    /// The physical field-of-view diagonal, in mm.
    pub fn diagonal(&self) -> f64 {
        let height = (self.shape[0].saturating_sub(1)) as f64 * self.spacing[1];
        let width = (self.shape[1].saturating_sub(1)) as f64 * self.spacing[0];
        (height * height + width * width).sqrt()
    }
}

/// Deformable 2D transform backed by a grid of displacement vectors.
///
/// The control tensor has shape `[2, GH, GW]` with component 0 holding x
/// displacements and component 1 holding y displacements, both in mm.
#[derive(Module, Debug)]
pub struct DisplacementFieldTransform2D<B: Backend> {
    control: Param<Tensor<B, 3>>,
    domain: Ignored<FieldDomain>,
    /// Control-point spacing in pixels, `(x, y)`.
    grid_spacing: Ignored<[f64; 2]>,
}

impl<B: Backend> DisplacementFieldTransform2D<B> {
    /// Create a transform from an existing control grid.
    ///
    /// # Panics
    /// Panics if the control tensor does not have two components or does
    /// not cover the domain at the given control spacing.
    pub fn new(control: Tensor<B, 3>, domain: FieldDomain, grid_spacing: [f64; 2]) -> Self {
        let [c, gh, gw] = control.dims();
        assert_eq!(c, 2, "A 2D displacement field needs exactly 2 components");
        let [expected_gh, expected_gw] = control_shape(domain.shape, grid_spacing);
        assert_eq!(
            [gh, gw],
            [expected_gh, expected_gw],
            "Control grid {}x{} does not cover a {:?} domain at spacing {:?}",
            gh,
            gw,
            domain.shape,
            grid_spacing
        );
        Self {
            control: Param::from_tensor(control),
            domain: Ignored(domain),
            grid_spacing: Ignored(grid_spacing),
        }
    }

    /// The identity transform: zero displacement everywhere.
    pub fn identity(domain: FieldDomain, grid_spacing: [f64; 2], device: &B::Device) -> Self {
        let [gh, gw] = control_shape(domain.shape, grid_spacing);
        let control = Tensor::zeros([2, gh, gw], device);
        Self::new(control, domain, grid_spacing)
    }

    /// The control-point displacements, shape `[2, GH, GW]`.
    pub fn control_points(&self) -> Tensor<B, 3> {
        self.control.val()
    }

    /// The domain this field deforms.
    pub fn domain(&self) -> &FieldDomain {
        &self.domain.0
    }

    /// Control-point spacing in pixels.
    pub fn grid_spacing(&self) -> [f64; 2] {
        self.grid_spacing.0
    }

    /// Materialize the dense per-pixel displacement field, shape `[2, H, W]`,
    /// in mm.
    pub fn dense_field(&self) -> Tensor<B, 3> {
        let [h, w] = self.domain.0.shape;
        let device = self.control.val().device();
        let grid = sample_grid_2d::<B>([h, w], &device);
        let displacement = self.sample_displacement(self.pixel_to_control(grid));
        let dx = displacement.clone().narrow(1, 0, 1).reshape([1, h, w]);
        let dy = displacement.narrow(1, 1, 1).reshape([1, h, w]);
        Tensor::cat(vec![dx, dy], 0)
    }

    /// Interpolate the control grid at control-space indices, `[N, 2]` in,
    /// `[N, 2]` (mm) out.
    fn sample_displacement(&self, control_indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let field = self.control.val();
        let [_, gh, gw] = field.dims();
        let ux = field.clone().slice([0..1, 0..gh, 0..gw]).reshape([gh, gw]);
        let uy = field.slice([1..2, 0..gh, 0..gw]).reshape([gh, gw]);

        let interpolator = LinearInterpolator::new();
        let dx = interpolator.interpolate(&ux, control_indices.clone());
        let dy = interpolator.interpolate(&uy, control_indices);
        Tensor::stack(vec![dx, dy], 1)
    }

    fn pixel_to_control(&self, pixel_indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = pixel_indices.device();
        pixel_indices / row(self.grid_spacing.0, &device)
    }

    fn world_to_pixel(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let domain = &self.domain.0;
        let origin = row([domain.origin[0], domain.origin[1]], &device);
        let spacing = row([domain.spacing[0], domain.spacing[1]], &device);
        (points - origin) / spacing
    }
}

impl<B: Backend> Transform<B, 2> for DisplacementFieldTransform2D<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let control_indices = self.pixel_to_control(self.world_to_pixel(points.clone()));
        let displacement = self.sample_displacement(control_indices);
        points + displacement
    }
}

/// Control-grid shape covering `shape` pixels at the given control spacing.
fn control_shape(shape: [usize; 2], grid_spacing: [f64; 2]) -> [usize; 2] {
    assert!(
        grid_spacing[0] >= 1.0 && grid_spacing[1] >= 1.0,
        "Control spacing must be at least one pixel, got {:?}",
        grid_spacing
    );
    let gh = ((shape[0] - 1) as f64 / grid_spacing[1]).ceil() as usize + 1;
    let gw = ((shape[1] - 1) as f64 / grid_spacing[0]).ceil() as usize + 1;
    [gh, gw]
}

fn row<B: Backend>(values: [f64; 2], device: &B::Device) -> Tensor<B, 2> {
    let data: Vec<f32> = values.iter().map(|v| *v as f32).collect();
    Tensor::<B, 1>::from_data(TensorData::new(data, Shape::new([2])), device).reshape([1, 2])
}
