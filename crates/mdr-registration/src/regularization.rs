//! Smoothness penalties for displacement fields.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// First-order (diffusion) regularizer for a control-point grid.
///
/// Penalizes squared differences between neighbouring control points,
/// which keeps the deformation smooth without forbidding large coherent
/// motion. The penalty is `weight * mean(|∇u|²)` over both displacement
/// components.
#[derive(Debug, Clone)]
pub struct DiffusionRegularizer {
    weight: f64,
}

impl DiffusionRegularizer {
    /// Create a regularizer with the given weight.
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }

    /// The penalty for a `[2, GH, GW]` control grid with `GH, GW >= 2`.
    pub fn penalty<B: Backend>(&self, control: Tensor<B, 3>) -> Tensor<B, 1> {
        let [c, gh, gw] = control.dims();

        let dy = control.clone().slice([0..c, 1..gh, 0..gw])
            - control.clone().slice([0..c, 0..gh - 1, 0..gw]);
        let dx = control.clone().slice([0..c, 0..gh, 1..gw])
            - control.slice([0..c, 0..gh, 0..gw - 1]);

        (dy.powf_scalar(2.0).mean() + dx.powf_scalar(2.0).mean()).mul_scalar(self.weight)
    }

    /// The regularization weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }
}

impl Default for DiffusionRegularizer {
    fn default() -> Self {
        Self::new(0.01)
    }
}
