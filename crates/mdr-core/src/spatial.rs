//! Spatial types for physical coordinates and pixel spacing.
//!
//! Thin wrappers around nalgebra types. Points represent positions in
//! physical space (mm); spacing is the physical distance between pixel
//! centres along each axis.

use nalgebra::{Point as NaPoint, SVector};
use serde::{Deserialize, Serialize};

/// A point in D-dimensional physical space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<const D: usize>(pub NaPoint<f64, D>);

impl<const D: usize> Point<D> {
    /// Create a point from per-axis coordinates.
    pub fn new(coords: [f64; D]) -> Self {
        Self(NaPoint::from(coords))
    }

    /// The origin of physical space (all coordinates zero).
    pub fn origin() -> Self {
        Self(NaPoint::origin())
    }
}

impl<const D: usize> std::ops::Index<usize> for Point<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<usize> for Point<D> {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.0[index]
    }
}

/// Physical distance between pixel centres along each axis, in mm.
///
/// All components must be strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacing<const D: usize>(pub SVector<f64, D>);

impl<const D: usize> Spacing<D> {
    /// Create a spacing from per-axis distances.
    ///
    /// # Panics
    /// Panics if any component is not strictly positive.
    pub fn new(spacing: [f64; D]) -> Self {
        assert!(
            spacing.iter().all(|s| *s > 0.0),
            "Spacing components must be strictly positive, got {:?}",
            spacing
        );
        Self(SVector::from(spacing))
    }

    /// Unit spacing (1 mm along every axis).
    pub fn ones() -> Self {
        Self(SVector::repeat(1.0))
    }

    /// The smallest per-axis spacing.
    pub fn min(&self) -> f64 {
        self.0.iter().cloned().fold(f64::INFINITY, f64::min)
    }
}

impl<const D: usize> std::ops::Index<usize> for Spacing<D> {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

pub type Point2 = Point<2>;
pub type Point3 = Point<3>;
pub type Spacing2 = Spacing<2>;
pub type Spacing3 = Spacing<3>;
