//! Bi-exponential (IVIM) diffusion model.

use crate::model::{PixelFit, SignalModel};
use crate::nlls::LevenbergMarquardt;

/// Intravoxel incoherent motion model,
/// `S(b) = S0 * (f * exp(-b * D*) + (1 - f) * exp(-b * D))`,
/// separating perfusion (`f`, `D*`) from tissue diffusion (`D`).
///
/// Initialized with the standard segmented approach: a mono-exponential
/// fit over the high-b regime pins `D`, the b=0 intercept deficit gives
/// `f`, and a full four-parameter refinement follows.
#[derive(Debug, Clone)]
pub struct IvimModel {
    b_values: Vec<f64>,
    solver: LevenbergMarquardt,
}

/// Above this b-value (s/mm^2) the perfusion compartment is assumed to
/// have decayed away.
const PERFUSION_CUTOFF: f64 = 200.0;

impl IvimModel {
    /// Create a model over the given b-values (s/mm^2).
    pub fn new(b_values: Vec<f64>) -> Self {
        assert!(
            b_values.len() >= 4,
            "A bi-exponential fit needs at least four b-values"
        );
        Self {
            b_values,
            solver: LevenbergMarquardt::default(),
        }
    }

    fn predict(&self, p: &[f64]) -> Vec<f64> {
        let (s0, f, d_star, d) = (p[0], p[1], p[2].max(0.0), p[3].max(0.0));
        self.b_values
            .iter()
            .map(|b| s0 * (f * (-b * d_star).exp() + (1.0 - f) * (-b * d).exp()))
            .collect()
    }

    /// Segmented initial guess `(S0, f, D*, D)`.
    fn initial_guess(&self, series: &[f64]) -> Option<[f64; 4]> {
        let max_b = self.b_values.iter().cloned().fold(0.0, f64::max);
        let cutoff = if max_b > PERFUSION_CUTOFF {
            PERFUSION_CUTOFF
        } else {
            max_b / 2.0
        };

        // Log-linear fit of the high-b tail.
        let tail: Vec<(f64, f64)> = self
            .b_values
            .iter()
            .zip(series.iter())
            .filter(|(b, s)| **b >= cutoff && **s > 0.0)
            .map(|(b, s)| (*b, s.ln()))
            .collect();
        if tail.len() < 2 {
            return None;
        }
        let n = tail.len() as f64;
        let mean_b = tail.iter().map(|(b, _)| b).sum::<f64>() / n;
        let mean_y = tail.iter().map(|(_, y)| y).sum::<f64>() / n;
        let var_b: f64 = tail.iter().map(|(b, _)| (b - mean_b).powi(2)).sum();
        if var_b <= 0.0 {
            return None;
        }
        let cov: f64 = tail.iter().map(|(b, y)| (b - mean_b) * (y - mean_y)).sum();

        let d = (-cov / var_b).max(1e-6);
        let intercept = (mean_y + d * mean_b).exp();

        let s0 = series
            .iter()
            .zip(self.b_values.iter())
            .filter(|(_, b)| **b == self.b_values.iter().cloned().fold(f64::INFINITY, f64::min))
            .map(|(s, _)| *s)
            .next()
            .unwrap_or(intercept);
        let f = (1.0 - intercept / s0.max(1e-12)).clamp(0.05, 0.5);

        Some([s0, f, 10.0 * d, d])
    }
}

impl SignalModel for IvimModel {
    fn name(&self) -> &'static str {
        "ivim"
    }

    fn num_frames(&self) -> usize {
        self.b_values.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        vec![
            "S0".to_string(),
            "f".to_string(),
            "Dstar".to_string(),
            "D".to_string(),
        ]
    }

    fn fit_pixel(&self, series: &[f64]) -> PixelFit {
        if series.iter().any(|s| !s.is_finite()) || series.iter().all(|s| *s <= 0.0) {
            return PixelFit::passthrough(series, 4);
        }
        let Some(initial) = self.initial_guess(series) else {
            return PixelFit::passthrough(series, 4);
        };

        match self.solver.minimize(&initial, series, |p| self.predict(p)) {
            Ok(outcome) if outcome.converged => {
                let mut parameters = outcome.parameters;
                parameters[1] = parameters[1].clamp(0.0, 1.0);
                parameters[2] = parameters[2].max(0.0);
                parameters[3] = parameters[3].max(0.0);
                let fitted = self.predict(&parameters);
                PixelFit {
                    fitted,
                    parameters,
                    converged: true,
                }
            }
            _ => PixelFit::passthrough(series, 4),
        }
    }
}
