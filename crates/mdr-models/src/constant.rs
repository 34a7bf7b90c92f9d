//! Constant (no-fit) model for registration-only pipelines.

use crate::model::{PixelFit, SignalModel};

/// Model whose prediction is the temporal mean of the pixel series.
///
/// Used when no signal model applies: every frame is registered towards
/// the average image, which tends towards a motion-free template as the
/// loop iterates.
#[derive(Debug, Clone)]
pub struct ConstantModel {
    num_frames: usize,
}

impl ConstantModel {
    /// Create a constant model for a series of `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        assert!(num_frames > 0, "A series needs at least one frame");
        Self { num_frames }
    }
}

impl SignalModel for ConstantModel {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn num_frames(&self) -> usize {
        self.num_frames
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["mean".to_string()]
    }

    fn fit_pixel(&self, series: &[f64]) -> PixelFit {
        if series.iter().any(|s| !s.is_finite()) {
            return PixelFit::passthrough(series, 1);
        }
        let mean = series.iter().sum::<f64>() / series.len() as f64;
        PixelFit {
            fitted: vec![mean; series.len()],
            parameters: vec![mean],
            converged: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_temporal_mean() {
        let model = ConstantModel::new(4);
        let fit = model.fit_pixel(&[1.0, 2.0, 3.0, 6.0]);
        assert!(fit.converged);
        assert_eq!(fit.parameters, vec![3.0]);
        assert_eq!(fit.fitted, vec![3.0; 4]);
    }

    #[test]
    fn flags_non_finite_series() {
        let model = ConstantModel::new(2);
        let fit = model.fit_pixel(&[1.0, f64::NAN]);
        assert!(!fit.converged);
        assert!(fit.parameters[0].is_nan());
    }
}
