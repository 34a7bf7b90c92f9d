//! Image and image-stack types.

pub mod grid;
#[allow(clippy::module_inception)]
pub mod image;
pub mod stack;

pub use image::Image;
pub use stack::ImageStack;
