//! Convergence tracking for the model-driven loop.

/// Tracks how much the deformation fields move between loop iterations.
///
/// Each field is a flattened `[2, H, W]` vector in mm, x displacements
/// first. The change for one iteration is the largest Euclidean
/// displacement difference over all pixels of all frames; the loop has
/// converged once that change drops below the precision threshold. The
/// first update is measured against the zero field.
#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    precision: f64,
    previous: Option<Vec<Vec<f32>>>,
}

impl ConvergenceMonitor {
    /// Create a monitor with the given precision threshold in mm.
    ///
    /// # Panics
    /// Panics if `precision` is not positive and finite.
    pub fn new(precision: f64) -> Self {
        assert!(
            precision.is_finite() && precision > 0.0,
            "Precision must be positive and finite, got {}",
            precision
        );
        Self {
            precision,
            previous: None,
        }
    }

    /// The precision threshold in mm.
    pub fn precision(&self) -> f64 {
        self.precision
    }

    /// Record this iteration's fields and return the maximum per-pixel
    /// displacement change in mm.
    pub fn update(&mut self, fields: &[Vec<f32>]) -> f64 {
        let change = fields
            .iter()
            .enumerate()
            .map(|(t, field)| {
                let previous = self.previous.as_ref().map(|p| p[t].as_slice());
                max_pixel_change(previous, field)
            })
            .fold(0.0, f64::max);

        self.previous = Some(fields.to_vec());
        change
    }

    /// Whether a change value satisfies the precision threshold.
    pub fn converged(&self, change: f64) -> bool {
        change < self.precision
    }
}

fn max_pixel_change(previous: Option<&[f32]>, current: &[f32]) -> f64 {
    let n = current.len() / 2;
    let mut max = 0.0f64;
    for p in 0..n {
        let (px, py) = match previous {
            Some(f) => (f[p], f[n + p]),
            None => (0.0, 0.0),
        };
        let dx = (current[p] - px) as f64;
        let dy = (current[n + p] - py) as f64;
        let change = (dx * dx + dy * dy).sqrt();
        if change > max {
            max = change;
        }
    }
    max
}
