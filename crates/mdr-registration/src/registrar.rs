//! Per-frame deformable registration.

use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use mdr_core::transform::{warp_image, DisplacementFieldTransform2D, FieldDomain};
use mdr_core::Image;
use serde::{Deserialize, Serialize};

use crate::error::{MdrError, Result};
use crate::metric::MetricKind;
use crate::optimizer::{AdamOptimizer, Optimizer};
use crate::regularization::DiffusionRegularizer;

/// Configuration for a single-frame deformable registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Gradient descent iterations per frame.
    pub max_iterations: usize,
    /// Adam learning rate, in mm per step at unit gradient.
    pub learning_rate: f64,
    /// Similarity metric driving the alignment.
    pub metric: MetricKind,
    /// Control-point spacing in pixels, `(x, y)`.
    pub grid_spacing: [f64; 2],
    /// Weight of the diffusion smoothness penalty.
    pub regularization_weight: f64,
    /// Largest admissible displacement magnitude in mm. `None` uses a
    /// quarter of the field-of-view diagonal.
    pub divergence_limit: Option<f64>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            learning_rate: 0.1,
            metric: MetricKind::MeanSquaredError,
            grid_spacing: [16.0, 16.0],
            regularization_weight: 0.01,
            divergence_limit: None,
        }
    }
}

impl RegistrationConfig {
    /// Check the configuration for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(MdrError::invalid_configuration(
                "max_iterations must be at least 1",
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(MdrError::invalid_configuration(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if self.grid_spacing.iter().any(|s| !(s.is_finite() && *s >= 1.0)) {
            return Err(MdrError::invalid_configuration(format!(
                "grid_spacing must be at least one pixel per axis, got {:?}",
                self.grid_spacing
            )));
        }
        if !(self.regularization_weight.is_finite() && self.regularization_weight >= 0.0) {
            return Err(MdrError::invalid_configuration(format!(
                "regularization_weight must be non-negative, got {}",
                self.regularization_weight
            )));
        }
        if let Some(limit) = self.divergence_limit {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(MdrError::invalid_configuration(format!(
                    "divergence_limit must be positive, got {}",
                    limit
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of registering one moving frame to one fixed target.
#[derive(Debug)]
pub struct FrameRegistration<B: Backend> {
    /// The moving frame resampled through the final transform.
    pub warped: Image<B, 2>,
    /// The optimized transform, reusable as a warm start.
    pub transform: DisplacementFieldTransform2D<B>,
    /// Dense displacement field `[2, H, W]` in mm.
    pub field: Tensor<B, 3>,
    /// Loss value at the last optimizer step.
    pub final_loss: f64,
    /// Largest displacement magnitude produced by the optimizer, in mm.
    /// Reported even when the frame diverged and the field was reset.
    pub largest_deformation: f64,
    /// True when the deformation exceeded the divergence limit and the
    /// frame was left unwarped.
    pub diverged: bool,
}

/// Deformable registration of a single frame pair.
///
/// Optimizes a control-point displacement field with Adam against the
/// configured metric plus a diffusion penalty. A frame whose deformation
/// grows past the divergence limit is reset to the identity rather than
/// propagated into the loop.
#[derive(Debug, Clone)]
pub struct DeformableRegistrar {
    config: RegistrationConfig,
}

impl DeformableRegistrar {
    /// Create a registrar, validating the configuration.
    pub fn new(config: RegistrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Register `moving` onto `fixed`, both on the same grid.
    ///
    /// `warm_start` seeds the displacement field with the transform from
    /// a previous pass; `None` starts from the identity.
    pub fn register<B: AutodiffBackend>(
        &self,
        fixed: &Image<B, 2>,
        moving: &Image<B, 2>,
        warm_start: Option<DisplacementFieldTransform2D<B>>,
    ) -> Result<FrameRegistration<B>> {
        if fixed.shape() != moving.shape() {
            return Err(MdrError::ShapeMismatch {
                expected: fixed.shape().to_vec(),
                actual: moving.shape().to_vec(),
            });
        }

        let device = fixed.data().device();
        let domain = FieldDomain::new(*fixed.origin(), *fixed.spacing(), fixed.shape());
        let mut transform = match warm_start {
            Some(t) => t,
            None => DisplacementFieldTransform2D::identity(
                domain.clone(),
                self.config.grid_spacing,
                &device,
            ),
        };

        let regularizer = DiffusionRegularizer::new(self.config.regularization_weight);
        let mut optimizer: AdamOptimizer<DisplacementFieldTransform2D<B>, B> =
            AdamOptimizer::new(self.config.learning_rate);

        let mut final_loss = f64::NAN;
        for i in 0..self.config.max_iterations {
            let similarity = self.config.metric.forward(fixed, moving, &transform);
            let loss = similarity + regularizer.penalty(transform.control_points());
            final_loss = loss.clone().into_scalar().elem();

            if i % 50 == 0 {
                tracing::debug!(
                    iteration = i,
                    loss = final_loss,
                    metric = self.config.metric.name(),
                    "Registration step"
                );
            }

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &transform);
            transform = optimizer.step(transform, grads);
        }

        let field = transform.dense_field();
        let largest_deformation = max_magnitude(&field);
        let limit = self
            .config
            .divergence_limit
            .unwrap_or_else(|| domain.diagonal() / 4.0);

        if largest_deformation > limit {
            tracing::warn!(
                largest_deformation,
                limit,
                "Deformation exceeded the divergence limit, keeping the frame unwarped"
            );
            let identity =
                DisplacementFieldTransform2D::identity(domain, self.config.grid_spacing, &device);
            let field = identity.dense_field();
            return Ok(FrameRegistration {
                warped: moving.clone(),
                transform: identity,
                field,
                final_loss,
                largest_deformation,
                diverged: true,
            });
        }

        let warped = warp_image(moving, &transform);
        Ok(FrameRegistration {
            warped,
            transform,
            field,
            final_loss,
            largest_deformation,
            diverged: false,
        })
    }
}

/// Largest per-pixel displacement magnitude of a `[2, H, W]` field, in mm.
pub fn max_magnitude<B: Backend>(field: &Tensor<B, 3>) -> f64 {
    field
        .clone()
        .powf_scalar(2.0)
        .sum_dim(0)
        .sqrt()
        .max()
        .into_scalar()
        .elem()
}
