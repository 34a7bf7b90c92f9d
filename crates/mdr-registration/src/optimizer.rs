//! Gradient-based optimizers for transform parameters.

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer as BurnOptimizer};
use burn::tensor::backend::AutodiffBackend;

/// Updates a transform module from the gradients of a metric loss.
pub trait Optimizer<M: AutodiffModule<B>, B: AutodiffBackend> {
    /// Apply one update step and return the updated module.
    fn step(&mut self, module: M, gradients: GradientsParams) -> M;

    /// The current learning rate.
    fn learning_rate(&self) -> f64;

    /// Change the learning rate for subsequent steps.
    fn set_learning_rate(&mut self, lr: f64);
}

/// Adam optimizer, a wrapper around Burn's implementation.
pub struct AdamOptimizer<M: AutodiffModule<B>, B: AutodiffBackend> {
    optimizer: OptimizerAdaptor<Adam, M, B>,
    learning_rate: f64,
}

impl<M: AutodiffModule<B>, B: AutodiffBackend> AdamOptimizer<M, B> {
    /// Create an Adam optimizer with default moment coefficients.
    pub fn new(learning_rate: f64) -> Self {
        let config = AdamConfig::new();
        Self {
            optimizer: config.init(),
            learning_rate,
        }
    }
}

impl<M, B> Optimizer<M, B> for AdamOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        self.optimizer.step(self.learning_rate, module, gradients)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
