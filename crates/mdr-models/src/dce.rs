//! Two-compartment filtration model for DCE-MRI.

use nalgebra::{DMatrix, DVector};

use crate::model::{PixelFit, SignalModel};
use crate::nlls::{cumulative_trapezoid, solve_least_squares};

/// Linearized two-compartment filtration model (2CFM) for renal DCE-MRI.
///
/// With plasma concentration `ca(t)` (the arterial input corrected for
/// hematocrit) and tissue concentration `C(t)`, the 2CFM satisfies
///
/// ```text
/// C = x0 * I2(ca) + x1 * I1(ca) - x2 * I2(C) - x3 * I1(C)
/// ```
///
/// where `I1`/`I2` are first and second cumulative integrals. The four
/// coefficients come from one linear least-squares solve per pixel and
/// map back to plasma flow `Fp`, plasma transit time `Tp`, tubular flow
/// `Ft` and tubular transit time `Tt`:
///
/// ```text
/// x1 = Fp,   x3 = 1/Tp + 1/Tt,   x2 = 1/(Tp * Tt),   x0 = Fp/Tt + Ft/Tp
/// ```
#[derive(Debug, Clone)]
pub struct TwoCompartmentFiltrationModel {
    aif: Vec<f64>,
    times: Vec<f64>,
    baseline: usize,
    hematocrit: f64,
}

impl TwoCompartmentFiltrationModel {
    /// Create a model from the arterial input function sampled at `times`
    /// (s), the number of pre-contrast baseline frames, and the blood
    /// hematocrit fraction.
    pub fn new(aif: Vec<f64>, times: Vec<f64>, baseline: usize, hematocrit: f64) -> Self {
        assert_eq!(aif.len(), times.len(), "AIF must be sampled at every frame");
        assert!(times.len() >= 8, "A 2CFM fit needs a dense time series");
        assert!(
            baseline >= 1 && baseline < times.len(),
            "Baseline frame count {} out of range",
            baseline
        );
        assert!(
            hematocrit > 0.0 && hematocrit < 1.0,
            "Hematocrit must be a fraction in (0, 1)"
        );
        Self {
            aif,
            times,
            baseline,
            hematocrit,
        }
    }

    fn plasma_input(&self) -> Vec<f64> {
        let base: f64 = self.aif[..self.baseline].iter().sum::<f64>() / self.baseline as f64;
        self.aif
            .iter()
            .map(|a| (a - base) / (1.0 - self.hematocrit))
            .collect()
    }
}

impl SignalModel for TwoCompartmentFiltrationModel {
    fn name(&self) -> &'static str {
        "dce-2cfm"
    }

    fn num_frames(&self) -> usize {
        self.times.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        vec![
            "Fp".to_string(),
            "Tp".to_string(),
            "Ft".to_string(),
            "Tt".to_string(),
        ]
    }

    fn fit_pixel(&self, series: &[f64]) -> PixelFit {
        if series.iter().any(|s| !s.is_finite()) {
            return PixelFit::passthrough(series, 4);
        }

        let base: f64 = series[..self.baseline].iter().sum::<f64>() / self.baseline as f64;
        let concentration: Vec<f64> = series.iter().map(|s| s - base).collect();
        let ca = self.plasma_input();

        let i1_ca = cumulative_trapezoid(&self.times, &ca);
        let i2_ca = cumulative_trapezoid(&self.times, &i1_ca);
        let i1_c = cumulative_trapezoid(&self.times, &concentration);
        let i2_c = cumulative_trapezoid(&self.times, &i1_c);

        let n = self.times.len();
        let design = DMatrix::from_fn(n, 4, |row, col| match col {
            0 => i2_ca[row],
            1 => i1_ca[row],
            2 => -i2_c[row],
            3 => -i1_c[row],
            _ => unreachable!(),
        });
        let observed = DVector::from_vec(concentration.clone());

        let x = match solve_least_squares(&design, &observed) {
            Ok(x) => x,
            Err(_) => return PixelFit::passthrough(series, 4),
        };

        let fitted: Vec<f64> = (&design * &x).iter().map(|c| c + base).collect();

        // Unpack the rate constants: 1/Tp and 1/Tt are the roots of
        // r^2 - x3 * r + x2 = 0, with the faster rate assigned to plasma.
        let fp = x[1];
        let discriminant = (x[3] * x[3] - 4.0 * x[2]).max(0.0).sqrt();
        let fast = 0.5 * (x[3] + discriminant);
        let slow = 0.5 * (x[3] - discriminant);

        if !(fast > 0.0 && slow > 0.0) {
            return PixelFit::passthrough(series, 4);
        }
        let tp = 1.0 / fast;
        let tt = 1.0 / slow;
        let ft = (x[0] - fp * slow) / fast;
        let parameters = vec![fp, tp, ft, tt];
        if !parameters.iter().all(|p| p.is_finite()) {
            return PixelFit::passthrough(series, 4);
        }

        PixelFit {
            fitted,
            parameters,
            converged: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a tissue curve satisfying the discrete 2CFM relation exactly
    /// for the given coefficients, so a fit must recover them.
    fn synthesize(times: &[f64], ca: &[f64], x: [f64; 4]) -> Vec<f64> {
        let i1_ca = cumulative_trapezoid(times, ca);
        let i2_ca = cumulative_trapezoid(times, &i1_ca);

        let mut c = vec![0.0; times.len()];
        let (mut i1c, mut i2c) = (0.0, 0.0);
        for k in 1..times.len() {
            let dt = times[k] - times[k - 1];
            let q1 = i1c + 0.5 * c[k - 1] * dt;
            let q2 = i2c + 0.5 * (i1c + q1) * dt;
            let rhs = x[0] * i2_ca[k] + x[1] * i1_ca[k] - x[2] * q2 - x[3] * q1;
            c[k] = rhs / (1.0 + 0.25 * x[2] * dt * dt + 0.5 * x[3] * dt);
            i1c = q1 + 0.5 * c[k] * dt;
            i2c = q2 + 0.25 * c[k] * dt * dt;
        }
        c
    }

    fn bolus(times: &[f64]) -> Vec<f64> {
        times
            .iter()
            .map(|t| {
                let shifted: f64 = t - 15.0;
                if shifted > 0.0 {
                    5.0 * shifted * (-shifted / 20.0).exp()
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[test]
    fn recovers_filtration_parameters() {
        let times: Vec<f64> = (0..120).map(|i| i as f64 * 1.5).collect();
        let ca = bolus(&times);

        // Fp, Tp, Ft, Tt.
        let (fp, tp, ft, tt) = (0.02, 4.0, 0.005, 60.0);
        let x = [
            fp / tt + ft / tp,
            fp,
            1.0 / (tp * tt),
            1.0 / tp + 1.0 / tt,
        ];
        let tissue = synthesize(&times, &ca, x);

        let baseline = 10;
        let hematocrit = 0.45;
        // The model divides the AIF by (1 - hct); pre-scale so the plasma
        // input equals `ca`.
        let aif: Vec<f64> = ca.iter().map(|c| c * (1.0 - hematocrit)).collect();
        let model = TwoCompartmentFiltrationModel::new(aif, times, baseline, hematocrit);

        let fit = model.fit_pixel(&tissue);
        assert!(fit.converged);
        assert!((fit.parameters[0] - fp).abs() / fp < 0.05, "Fp: {}", fit.parameters[0]);
        assert!((fit.parameters[1] - tp).abs() / tp < 0.10, "Tp: {}", fit.parameters[1]);
        assert!((fit.parameters[2] - ft).abs() / ft < 0.15, "Ft: {}", fit.parameters[2]);
        assert!((fit.parameters[3] - tt).abs() / tt < 0.10, "Tt: {}", fit.parameters[3]);
    }

    #[test]
    fn flat_series_fails_gracefully() {
        let times: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let aif = vec![0.0; 20];
        let model = TwoCompartmentFiltrationModel::new(aif, times, 4, 0.45);

        let fit = model.fit_pixel(&[1.0; 20]);
        assert!(!fit.converged);
        // Failed pixels pass the original series through untouched and
        // carry all-NaN parameters.
        assert_eq!(fit.fitted, vec![1.0; 20]);
        assert!(fit.parameters.iter().all(|p| p.is_nan()));
    }
}
