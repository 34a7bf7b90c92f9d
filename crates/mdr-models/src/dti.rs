//! Diffusion tensor model with log-linear fitting.

use nalgebra::{DMatrix, DVector, Matrix3};

use crate::model::{PixelFit, SignalModel};
use crate::nlls::solve_least_squares;

/// Diffusion tensor imaging model.
///
/// `S(b, g) = S0 * exp(-b * g^T D g)` linearized as
/// `ln S = ln S0 - b * g^T D g` and solved per pixel as one least-squares
/// system in the seven unknowns `(ln S0, Dxx, Dyy, Dzz, Dxy, Dxz, Dyz)`.
/// Besides `S0`, the model exports the derived fractional anisotropy (FA)
/// and mean diffusivity (MD, the "ADC" map).
#[derive(Debug, Clone)]
pub struct DiffusionTensorModel {
    b_values: Vec<f64>,
    b_vectors: Vec<[f64; 3]>,
}

impl DiffusionTensorModel {
    /// Create a model from per-frame b-values (s/mm^2) and unit gradient
    /// directions.
    pub fn new(b_values: Vec<f64>, b_vectors: Vec<[f64; 3]>) -> Self {
        assert_eq!(
            b_values.len(),
            b_vectors.len(),
            "Need one gradient direction per b-value"
        );
        assert!(
            b_values.len() >= 7,
            "A tensor fit needs at least seven acquisitions, got {}",
            b_values.len()
        );
        Self { b_values, b_vectors }
    }

    fn design_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.b_values.len(), 7, |row, col| {
            let b = self.b_values[row];
            let [gx, gy, gz] = self.b_vectors[row];
            match col {
                0 => 1.0,
                1 => -b * gx * gx,
                2 => -b * gy * gy,
                3 => -b * gz * gz,
                4 => -2.0 * b * gx * gy,
                5 => -2.0 * b * gx * gz,
                6 => -2.0 * b * gy * gz,
                _ => unreachable!(),
            }
        })
    }
}

impl SignalModel for DiffusionTensorModel {
    fn name(&self) -> &'static str {
        "diffusion-tensor"
    }

    fn num_frames(&self) -> usize {
        self.b_values.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["S0".to_string(), "FA".to_string(), "MD".to_string()]
    }

    fn fit_pixel(&self, series: &[f64]) -> PixelFit {
        let peak = series.iter().cloned().fold(0.0, f64::max);
        if !peak.is_finite() || peak <= 0.0 || series.iter().any(|s| !s.is_finite()) {
            return PixelFit::passthrough(series, 3);
        }

        // Clamp away zeros so the log stays finite; genuinely dead pixels
        // were rejected above.
        let floor = 1e-6 * peak;
        let log_signal =
            DVector::from_iterator(series.len(), series.iter().map(|s| s.max(floor).ln()));

        let design = self.design_matrix();
        let beta = match solve_least_squares(&design, &log_signal) {
            Ok(beta) => beta,
            Err(_) => return PixelFit::passthrough(series, 3),
        };

        let fitted: Vec<f64> = (&design * &beta).iter().map(|v| v.exp()).collect();
        let s0 = beta[0].exp();

        let tensor = Matrix3::new(
            beta[1], beta[4], beta[5],
            beta[4], beta[2], beta[6],
            beta[5], beta[6], beta[3],
        );
        let eigenvalues = tensor.symmetric_eigen().eigenvalues;
        let md = eigenvalues.mean();
        let deviation: f64 = eigenvalues.iter().map(|l| (l - md).powi(2)).sum();
        let magnitude: f64 = eigenvalues.iter().map(|l| l * l).sum();
        let fa = if magnitude > 0.0 {
            (1.5 * deviation / magnitude).sqrt()
        } else {
            0.0
        };

        let parameters = vec![s0, fa, md];
        if parameters.iter().all(|p| p.is_finite()) {
            PixelFit {
                fitted,
                parameters,
                converged: true,
            }
        } else {
            PixelFit::passthrough(series, 3)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn six_directions() -> Vec<[f64; 3]> {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        vec![
            [s, s, 0.0],
            [s, -s, 0.0],
            [s, 0.0, s],
            [s, 0.0, -s],
            [0.0, s, s],
            [0.0, s, -s],
        ]
    }

    #[test]
    fn isotropic_tensor_has_zero_fa() {
        let mut b_values = vec![0.0];
        let mut b_vectors = vec![[0.0, 0.0, 0.0]];
        b_values.extend(vec![600.0; 6]);
        b_vectors.extend(six_directions());

        let model = DiffusionTensorModel::new(b_values.clone(), b_vectors);

        let (s0, md) = (1000.0, 2.0e-3);
        let series: Vec<f64> = b_values.iter().map(|b| s0 * (-b * md).exp()).collect();

        let fit = model.fit_pixel(&series);
        assert!(fit.converged);
        assert!((fit.parameters[0] - s0).abs() / s0 < 1e-6);
        assert!(fit.parameters[1].abs() < 1e-6, "FA should vanish, got {}", fit.parameters[1]);
        assert!((fit.parameters[2] - md).abs() / md < 1e-6);
    }

    #[test]
    fn dead_pixel_is_flagged() {
        let mut b_values = vec![0.0];
        let mut b_vectors = vec![[0.0, 0.0, 0.0]];
        b_values.extend(vec![600.0; 6]);
        b_vectors.extend(six_directions());

        let model = DiffusionTensorModel::new(b_values, b_vectors);
        let series = vec![0.0; 7];
        let fit = model.fit_pixel(&series);

        assert!(!fit.converged);
        assert_eq!(fit.fitted, series);
        assert!(fit.parameters.iter().all(|p| p.is_nan()));
    }
}
