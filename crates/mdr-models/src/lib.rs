//! Quantitative MRI signal models for model-driven registration.
//!
//! Each model maps fixed acquisition parameters (b-values, inversion
//! times, echo times, an arterial input function, ...) to an expected
//! signal curve and fits that curve to one pixel's intensity time series.
//! The fitted curves drive the registration targets; the fitted model
//! parameters become quantitative parameter maps.
//!
//! Per-pixel failures are isolated by contract: a model never panics on a
//! pathological series, it returns the series unchanged and flags the
//! pixel instead.

pub mod constant;
pub mod dce;
pub mod dti;
pub mod error;
pub mod exponential;
pub mod ivim;
pub mod model;
pub mod nlls;
pub mod t1;

pub use constant::ConstantModel;
pub use dce::TwoCompartmentFiltrationModel;
pub use dti::DiffusionTensorModel;
pub use error::FitError;
pub use exponential::MonoExponentialModel;
pub use ivim::IvimModel;
pub use model::{fit_image, ImageFit, PixelFit, SignalModel};
pub use t1::InversionRecoveryModel;
