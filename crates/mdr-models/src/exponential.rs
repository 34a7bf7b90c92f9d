//! Mono-exponential decay model for T2 and T2* relaxometry.

use crate::model::{PixelFit, SignalModel};
use crate::nlls::LevenbergMarquardt;

/// `S(t) = S0 * exp(-t / tau)` fitted over echo times `t`.
///
/// The relaxation constant is labelled per sequence ("T2" for spin-echo
/// trains, "T2star" for multi-echo gradient echo); the math is shared.
#[derive(Debug, Clone)]
pub struct MonoExponentialModel {
    times: Vec<f64>,
    label: &'static str,
    solver: LevenbergMarquardt,
}

impl MonoExponentialModel {
    /// Mono-exponential decay over arbitrary sampling times.
    pub fn new(times: Vec<f64>, label: &'static str) -> Self {
        assert!(times.len() >= 2, "Need at least two samples to fit a decay");
        Self {
            times,
            label,
            solver: LevenbergMarquardt::default(),
        }
    }

    /// T2 decay over the given echo times (ms).
    pub fn t2(echo_times: Vec<f64>) -> Self {
        Self::new(echo_times, "T2")
    }

    /// T2* decay over the given echo times (ms).
    pub fn t2star(echo_times: Vec<f64>) -> Self {
        Self::new(echo_times, "T2star")
    }

    fn predict(&self, s0: f64, tau: f64) -> Vec<f64> {
        let tau = tau.max(1e-9);
        self.times.iter().map(|t| s0 * (-t / tau).exp()).collect()
    }

    /// Log-linear initial estimate of `(S0, tau)` from positive samples.
    fn initial_guess(&self, series: &[f64]) -> Option<(f64, f64)> {
        let max_time = self.times.iter().cloned().fold(0.0, f64::max);
        let points: Vec<(f64, f64)> = self
            .times
            .iter()
            .zip(series.iter())
            .filter(|(_, s)| **s > 0.0)
            .map(|(t, s)| (*t, s.ln()))
            .collect();
        if points.len() < 2 {
            return None;
        }

        let n = points.len() as f64;
        let mean_t = points.iter().map(|(t, _)| t).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
        let var_t: f64 = points.iter().map(|(t, _)| (t - mean_t).powi(2)).sum();
        if var_t <= 0.0 {
            return None;
        }
        let cov: f64 = points.iter().map(|(t, y)| (t - mean_t) * (y - mean_y)).sum();

        let slope = cov / var_t;
        let tau = if slope < 0.0 { -1.0 / slope } else { 3.0 * max_time.max(1.0) };
        let s0 = (mean_y - slope * mean_t).exp();
        Some((s0, tau))
    }
}

impl SignalModel for MonoExponentialModel {
    fn name(&self) -> &'static str {
        "mono-exponential"
    }

    fn num_frames(&self) -> usize {
        self.times.len()
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["S0".to_string(), self.label.to_string()]
    }

    fn fit_pixel(&self, series: &[f64]) -> PixelFit {
        if series.iter().any(|s| !s.is_finite()) {
            return PixelFit::passthrough(series, 2);
        }
        let Some((s0, tau)) = self.initial_guess(series) else {
            return PixelFit::passthrough(series, 2);
        };

        match self
            .solver
            .minimize(&[s0, tau], series, |p| self.predict(p[0], p[1]))
        {
            Ok(outcome) if outcome.converged => {
                let fitted = self.predict(outcome.parameters[0], outcome.parameters[1]);
                PixelFit {
                    fitted,
                    parameters: outcome.parameters,
                    converged: true,
                }
            }
            // A failed fit leaves the series untouched so the pixel keeps
            // its original signal downstream.
            _ => PixelFit::passthrough(series, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_clean_t2_decay() {
        let echo_times: Vec<f64> = (0..11).map(|i| i as f64 * 12.0).collect();
        let model = MonoExponentialModel::t2(echo_times.clone());

        let series: Vec<f64> = echo_times.iter().map(|t| 200.0 * (-t / 80.0).exp()).collect();
        let fit = model.fit_pixel(&series);

        assert!(fit.converged);
        assert!((fit.parameters[0] - 200.0).abs() < 1e-2);
        assert!((fit.parameters[1] - 80.0).abs() < 1e-2);
    }

    #[test]
    fn zero_series_is_flagged_passthrough() {
        let model = MonoExponentialModel::t2star(vec![5.0, 10.0, 20.0, 40.0]);
        let series = vec![0.0; 4];
        let fit = model.fit_pixel(&series);

        assert!(!fit.converged);
        assert_eq!(fit.fitted, series);
        assert!(fit.parameters.iter().all(|p| p.is_nan()));
    }

    #[test]
    fn labels_follow_the_sequence() {
        let t2 = MonoExponentialModel::t2(vec![0.0, 1.0]);
        let t2star = MonoExponentialModel::t2star(vec![0.0, 1.0]);
        assert_eq!(t2.parameter_names()[1], "T2");
        assert_eq!(t2star.parameter_names()[1], "T2star");
    }
}
