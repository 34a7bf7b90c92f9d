//! The signal-model trait and whole-image fitting.

use rayon::prelude::*;

/// Result of fitting one pixel's time series.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelFit {
    /// Model-predicted intensity per frame, same length as the input.
    pub fitted: Vec<f64>,
    /// Fitted model parameters, one per [`SignalModel::parameter_names`] entry.
    pub parameters: Vec<f64>,
    /// False when the fit failed and `fitted` is the unmodified input.
    pub converged: bool,
}

impl PixelFit {
    /// Flagged passthrough for a pixel whose fit failed: the series is
    /// returned unchanged and every parameter is NaN.
    pub fn passthrough(series: &[f64], num_parameters: usize) -> Self {
        Self {
            fitted: series.to_vec(),
            parameters: vec![f64::NAN; num_parameters],
            converged: false,
        }
    }
}

/// A parametric signal model fit per pixel across the frame dimension.
///
/// Implementations own their acquisition parameters (echo times,
/// b-values, ...), supplied once at construction, and are stateless with
/// respect to the pixel data: `fit_pixel` is pure and may be called from
/// many threads at once.
pub trait SignalModel: Send + Sync {
    /// Short model identifier used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Number of frames the model expects per pixel series.
    fn num_frames(&self) -> usize;

    /// Names of the fitted parameters, in `PixelFit::parameters` order.
    fn parameter_names(&self) -> Vec<String>;

    /// Fit one pixel's intensity series.
    ///
    /// Must not panic on pathological input; failures are reported as a
    /// flagged [`PixelFit::passthrough`].
    fn fit_pixel(&self, series: &[f64]) -> PixelFit;
}

/// Result of fitting a model to every pixel of a frame stack.
#[derive(Debug, Clone)]
pub struct ImageFit {
    /// Model-predicted images, row-major `[T, H, W]` like the input.
    pub fitted: Vec<f64>,
    /// One map per model parameter, each of length `num_pixels`.
    pub parameter_maps: Vec<Vec<f64>>,
    /// Indices of pixels whose fit failed, in ascending order.
    pub failed_pixels: Vec<usize>,
}

/// Fit `model` independently to every pixel of a frame-major series.
///
/// `series` holds the stack as `[T, H, W]` row-major values; pixels are
/// fitted in parallel and results are written back by pixel index, so the
/// output is independent of scheduling order.
///
/// # Panics
/// Panics if `series` is not a whole number of frames of `model`'s size.
pub fn fit_image(model: &dyn SignalModel, series: &[f64], num_frames: usize) -> ImageFit {
    assert_eq!(num_frames, model.num_frames(), "Frame count does not match model");
    assert!(num_frames > 0, "Model must expect at least one frame");
    assert_eq!(
        series.len() % num_frames,
        0,
        "Series length {} is not a multiple of the frame count {}",
        series.len(),
        num_frames
    );
    let num_pixels = series.len() / num_frames;
    let num_parameters = model.parameter_names().len();

    let fits: Vec<PixelFit> = (0..num_pixels)
        .into_par_iter()
        .map(|pixel| {
            let pixel_series: Vec<f64> =
                (0..num_frames).map(|t| series[t * num_pixels + pixel]).collect();
            let fit = model.fit_pixel(&pixel_series);
            debug_assert_eq!(fit.fitted.len(), num_frames);
            debug_assert_eq!(fit.parameters.len(), num_parameters);
            fit
        })
        .collect();

    let mut fitted = vec![0.0; series.len()];
    let mut parameter_maps = vec![vec![0.0; num_pixels]; num_parameters];
    let mut failed_pixels = Vec::new();

    for (pixel, fit) in fits.iter().enumerate() {
        for t in 0..num_frames {
            fitted[t * num_pixels + pixel] = fit.fitted[t];
        }
        for (k, map) in parameter_maps.iter_mut().enumerate() {
            map[pixel] = fit.parameters[k];
        }
        if !fit.converged {
            failed_pixels.push(pixel);
        }
    }

    if !failed_pixels.is_empty() {
        tracing::debug!(
            model = model.name(),
            failed = failed_pixels.len(),
            pixels = num_pixels,
            "Some pixel fits did not converge"
        );
    }

    ImageFit {
        fitted,
        parameter_maps,
        failed_pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ConstantModel;

    #[test]
    fn fit_image_keeps_pixel_indexing() {
        let model = ConstantModel::new(2);
        // 2 frames of 2x1 pixels: pixel 0 -> (1, 3), pixel 1 -> (2, 4).
        let series = vec![1.0, 2.0, 3.0, 4.0];

        let fit = fit_image(&model, &series, 2);
        assert_eq!(fit.fitted, vec![2.0, 3.0, 2.0, 3.0]);
        assert_eq!(fit.parameter_maps[0], vec![2.0, 3.0]);
        assert!(fit.failed_pixels.is_empty());
    }

    #[test]
    #[should_panic]
    fn fit_image_rejects_partial_frames() {
        let model = ConstantModel::new(2);
        let series = vec![1.0, 2.0, 3.0];
        let _ = fit_image(&model, &series, 2);
    }
}
