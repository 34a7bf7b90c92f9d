//! Image interpolation.

pub mod linear;
pub mod trait_;

pub use linear::LinearInterpolator;
pub use trait_::Interpolator;
