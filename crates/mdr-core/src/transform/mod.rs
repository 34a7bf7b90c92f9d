//! Spatial transforms.

pub mod displacement_field;
pub mod trait_;
pub mod warp;

pub use displacement_field::{DisplacementFieldTransform2D, FieldDomain};
pub use trait_::Transform;
pub use warp::warp_image;
