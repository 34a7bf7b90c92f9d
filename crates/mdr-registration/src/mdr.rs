//! The model-driven registration loop.
//!
//! Alternates per-pixel signal-model fitting with per-frame deformable
//! registration. Each pass fits the model to the current motion-corrected
//! series, then re-registers the original frames onto the fitted target
//! images, so interpolation blur never compounds across passes. The loop
//! stops once the deformation fields settle to within the precision
//! threshold, the iteration cap is hit, or the caller cancels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Tensor;
use mdr_core::transform::DisplacementFieldTransform2D;
use mdr_core::ImageStack;
use mdr_models::{fit_image, SignalModel};
use serde::{Deserialize, Serialize};

use crate::convergence::ConvergenceMonitor;
use crate::error::{MdrError, Result};
use crate::registrar::{DeformableRegistrar, FrameRegistration, RegistrationConfig};

/// Configuration for the model-driven registration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdrConfig {
    /// Convergence threshold in mm: the loop stops once no pixel's
    /// displacement changes by more than this between passes.
    pub precision: f64,
    /// Hard cap on fit/register passes.
    pub max_iterations: usize,
    /// Per-frame registration settings.
    pub registration: RegistrationConfig,
}

impl Default for MdrConfig {
    fn default() -> Self {
        Self {
            precision: 1.0,
            max_iterations: 10,
            registration: RegistrationConfig::default(),
        }
    }
}

impl MdrConfig {
    /// Check the configuration for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !(self.precision.is_finite() && self.precision > 0.0) {
            return Err(MdrError::invalid_configuration(format!(
                "precision must be positive and finite, got {}",
                self.precision
            )));
        }
        if self.max_iterations == 0 {
            return Err(MdrError::invalid_configuration(
                "max_iterations must be at least 1",
            ));
        }
        self.registration.validate()
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// The deformation fields settled to within the precision threshold.
    Converged,
    /// The iteration cap was reached before convergence.
    Forced,
    /// The caller cancelled between phases.
    Cancelled,
}

/// Per-frame registration record for one loop pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Frame index within the stack.
    pub frame: usize,
    /// Metric loss at the last optimizer step.
    pub final_loss: f64,
    /// Largest displacement magnitude produced for this frame, in mm.
    pub largest_deformation: f64,
    /// True when the frame hit the divergence limit and was reset.
    pub diverged: bool,
}

/// Record of one fit/register pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based pass number.
    pub iteration: usize,
    /// Maximum per-pixel displacement change against the previous pass,
    /// in mm.
    pub field_change: f64,
    /// Number of pixels whose model fit failed this pass.
    pub failed_pixels: usize,
    /// Per-frame registration outcomes.
    pub frames: Vec<FrameRecord>,
}

/// Diagnostics accumulated over a loop run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    /// One record per completed fit/register pass.
    pub iterations: Vec<IterationRecord>,
}

impl Diagnostics {
    /// The frames with the largest deformation across the whole run,
    /// sorted descending, at most `count` entries.
    ///
    /// Useful for spotting frames where motion correction worked hardest
    /// or ran away.
    pub fn largest_deformations(&self, count: usize) -> Vec<(usize, f64)> {
        let mut per_frame: Vec<(usize, f64)> = Vec::new();
        for record in &self.iterations {
            for frame in &record.frames {
                match per_frame.iter_mut().find(|(t, _)| *t == frame.frame) {
                    Some((_, max)) => *max = max.max(frame.largest_deformation),
                    None => per_frame.push((frame.frame, frame.largest_deformation)),
                }
            }
        }
        per_frame.sort_by(|a, b| b.1.total_cmp(&a.1));
        per_frame.truncate(count);
        per_frame
    }
}

/// A named quantitative parameter map, one value per pixel in row-major
/// order. Failed pixels hold NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterMap {
    /// Parameter name as reported by the signal model.
    pub name: String,
    /// Row-major `[H, W]` values.
    pub values: Vec<f64>,
}

/// Everything a finished loop run produces.
#[derive(Debug)]
pub struct MdrOutput<B: AutodiffBackend> {
    /// The original frames warped by the final per-frame transforms.
    pub coregistered: ImageStack<B>,
    /// The signal model evaluated at the final fit, frame by frame.
    pub model_fit: ImageStack<B>,
    /// Quantitative maps from the final fit.
    pub parameter_maps: Vec<ParameterMap>,
    /// Pixels whose final fit failed, ascending. Their map entries are NaN.
    pub failed_pixels: Vec<usize>,
    /// Final dense displacement fields, one `[2, H, W]` tensor per frame,
    /// in mm. Zero for frames that were never registered.
    pub fields: Vec<Tensor<B, 3>>,
    /// Per-pass records.
    pub diagnostics: Diagnostics,
    /// Why the loop stopped.
    pub termination: TerminationReason,
    /// Number of completed fit/register passes.
    pub iterations_run: usize,
}

/// The fit/register loop, generic over the signal model.
pub struct MdrLoop<M: SignalModel> {
    model: M,
    config: MdrConfig,
    registrar: DeformableRegistrar,
    cancel: Arc<AtomicBool>,
}

impl<M: SignalModel> MdrLoop<M> {
    /// Create a loop for one model and configuration.
    pub fn new(model: M, config: MdrConfig) -> Result<Self> {
        config.validate()?;
        let registrar = DeformableRegistrar::new(config.registration.clone())?;
        Ok(Self {
            model,
            config,
            registrar,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The signal model driving the loop.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The active configuration.
    pub fn config(&self) -> &MdrConfig {
        &self.config
    }

    /// A token that cancels the run when set.
    ///
    /// Cancellation is checked between phases, so the current fit or
    /// registration pass finishes first. The run still returns complete
    /// output computed from the state reached so far.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Run the loop to termination on one frame stack.
    ///
    /// The stack must hold exactly the frames the model expects, in
    /// acquisition order.
    pub fn run<B: AutodiffBackend>(&self, stack: &ImageStack<B>) -> Result<MdrOutput<B>> {
        let expected = self.model.num_frames();
        if stack.num_frames() != expected {
            return Err(MdrError::FrameCountMismatch {
                model: self.model.name(),
                expected,
                actual: stack.num_frames(),
            });
        }

        let num_frames = stack.num_frames();
        let [h, w] = stack.frame_shape();
        let device = stack.frames().device();

        let mut current = stack.clone();
        let mut warm: Vec<Option<DisplacementFieldTransform2D<B>>> =
            (0..num_frames).map(|_| None).collect();
        let mut monitor = ConvergenceMonitor::new(self.config.precision);
        let mut diagnostics = Diagnostics::default();
        let mut termination = TerminationReason::Forced;
        let mut iterations_run = 0;
        let mut fields: Vec<Tensor<B, 3>> = Vec::new();

        tracing::info!(
            model = self.model.name(),
            frames = num_frames,
            precision_mm = self.config.precision,
            "Starting model-driven registration"
        );

        for iteration in 1..=self.config.max_iterations {
            if self.cancelled() {
                termination = TerminationReason::Cancelled;
                break;
            }

            let series = as_f64(&current.to_vec());
            let fit = fit_image(&self.model, &series, num_frames);
            let target = ImageStack::from_vec(
                as_f32(&fit.fitted),
                [num_frames, h, w],
                *stack.origin(),
                *stack.spacing(),
                &device,
            );

            if self.cancelled() {
                termination = TerminationReason::Cancelled;
                break;
            }

            let mut registrations = Vec::with_capacity(num_frames);
            for (t, warm_start) in warm.into_iter().enumerate() {
                let frame = self
                    .registrar
                    .register(&target.frame(t), &stack.frame(t), warm_start)?;
                registrations.push(frame);
            }

            let dense: Vec<Vec<f32>> = registrations
                .iter()
                .map(|r| r.field.clone().into_data().iter::<f32>().collect())
                .collect();
            let field_change = monitor.update(&dense);
            iterations_run = iteration;

            diagnostics.iterations.push(IterationRecord {
                iteration,
                field_change,
                failed_pixels: fit.failed_pixels.len(),
                frames: frame_records(&registrations),
            });
            tracing::info!(
                iteration,
                field_change_mm = field_change,
                failed_pixels = fit.failed_pixels.len(),
                "Completed fit/register pass"
            );

            current = current.with_frames(Tensor::stack(
                registrations.iter().map(|r| r.warped.data().clone()).collect(),
                0,
            ));
            fields = registrations.iter().map(|r| r.field.clone()).collect();
            warm = registrations.into_iter().map(|r| Some(r.transform)).collect();

            if monitor.converged(field_change) {
                termination = TerminationReason::Converged;
                break;
            }
        }

        // Final fit on the corrected series produces the quantitative maps.
        let series = as_f64(&current.to_vec());
        let fit = fit_image(&self.model, &series, num_frames);
        let model_fit = ImageStack::from_vec(
            as_f32(&fit.fitted),
            [num_frames, h, w],
            *stack.origin(),
            *stack.spacing(),
            &device,
        );
        let parameter_maps = self
            .model
            .parameter_names()
            .into_iter()
            .zip(fit.parameter_maps)
            .map(|(name, values)| ParameterMap { name, values })
            .collect();

        if fields.is_empty() {
            fields = (0..num_frames)
                .map(|_| Tensor::zeros([2, h, w], &device))
                .collect();
        }

        tracing::info!(
            ?termination,
            iterations_run,
            "Model-driven registration finished"
        );

        Ok(MdrOutput {
            coregistered: current,
            model_fit,
            parameter_maps,
            failed_pixels: fit.failed_pixels,
            fields,
            diagnostics,
            termination,
            iterations_run,
        })
    }
}

fn frame_records<B: AutodiffBackend>(registrations: &[FrameRegistration<B>]) -> Vec<FrameRecord> {
    registrations
        .iter()
        .enumerate()
        .map(|(frame, r)| FrameRecord {
            frame,
            final_loss: r.final_loss,
            largest_deformation: r.largest_deformation,
            diverged: r.diverged,
        })
        .collect()
}

fn as_f64(values: &[f32]) -> Vec<f64> {
    values.iter().map(|v| *v as f64).collect()
}

fn as_f32(values: &[f64]) -> Vec<f32> {
    values.iter().map(|v| *v as f32).collect()
}
