pub mod image;
pub mod interpolation;
pub mod spatial;
pub mod transform;

pub use image::{Image, ImageStack};
pub use spatial::{Point, Point2, Spacing, Spacing2};
