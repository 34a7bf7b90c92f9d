//! Model-driven registration for quantitative MRI series.
//!
//! Free-breathing quantitative MRI acquires one anatomy under a varying
//! acquisition parameter, so frames differ in both motion and contrast.
//! Registering frames to each other directly confuses the two; this crate
//! instead alternates two steps until the motion estimate settles:
//!
//! 1. fit a signal model per pixel through the current corrected series,
//! 2. register every original frame onto its model-predicted image.
//!
//! The model fit provides a motion-free, contrast-matched target for each
//! frame, and the corrected frames improve the next fit.
//!
//! [`MdrLoop`] drives the whole process; [`DeformableRegistrar`] is the
//! single-frame registration engine it builds on, usable on its own.

pub mod convergence;
pub mod error;
pub mod mdr;
pub mod metric;
pub mod optimizer;
pub mod registrar;
pub mod regularization;

pub use convergence::ConvergenceMonitor;
pub use error::{MdrError, Result};
pub use mdr::{
    Diagnostics, FrameRecord, IterationRecord, MdrConfig, MdrLoop, MdrOutput, ParameterMap,
    TerminationReason,
};
pub use metric::{MeanSquaredError, Metric, MetricKind, NormalizedCrossCorrelation};
pub use optimizer::{AdamOptimizer, Optimizer};
pub use registrar::{DeformableRegistrar, FrameRegistration, RegistrationConfig};
pub use regularization::DiffusionRegularizer;
