//! Shared least-squares machinery for signal-model fitting.
//!
//! Linear models solve a single least-squares system; nonlinear models
//! refine an analytic initial guess with a damped Gauss-Newton
//! (Levenberg-Marquardt) iteration using a forward-difference Jacobian.

use nalgebra::{DMatrix, DVector};

use crate::error::FitError;

/// Result of a nonlinear minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    /// Final parameter estimates.
    pub parameters: Vec<f64>,
    /// True when the iteration satisfied a convergence criterion, false
    /// when it stalled without reaching the minimum.
    pub converged: bool,
}

/// Damped Gauss-Newton minimizer for small per-pixel problems.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Relative cost-improvement threshold for convergence.
    pub tolerance: f64,
    /// Initial damping factor.
    pub initial_damping: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-8,
            initial_damping: 1e-3,
        }
    }
}

impl LevenbergMarquardt {
    /// Minimize the sum of squared residuals `observed - model(p)`.
    ///
    /// `model` maps a parameter vector to a predicted series of the same
    /// length as `observed`. The fit counts as converged when the cost
    /// drops to rounding level relative to the signal energy, when the
    /// proposed step becomes negligible against the parameter scale, or
    /// when an accepted step improves the cost by less than `tolerance`.
    pub fn minimize<F>(
        &self,
        initial: &[f64],
        observed: &[f64],
        model: F,
    ) -> Result<FitOutcome, FitError>
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        let n = observed.len();
        let k = initial.len();
        let mut parameters = initial.to_vec();

        let mut predicted = model(&parameters);
        let mut cost = residual_cost(observed, &predicted)?;
        // Residuals this far below the signal energy are rounding noise
        // (single-precision inputs land near 1e-14 relative), not lack of
        // fit.
        let energy: f64 = observed.iter().map(|o| o * o).sum();
        let cost_floor = (1e-12 * energy).max(f64::MIN_POSITIVE);
        if cost <= cost_floor {
            return Ok(FitOutcome {
                parameters,
                converged: true,
            });
        }
        let mut damping = self.initial_damping;

        for _ in 0..self.max_iterations {
            // Forward-difference Jacobian, one column per parameter.
            let jacobian = DMatrix::from_fn(n, k, |row, col| {
                let step = 1e-6 * parameters[col].abs().max(1.0);
                let mut bumped = parameters.clone();
                bumped[col] += step;
                let shifted = model(&bumped);
                (shifted[row] - predicted[row]) / step
            });

            let residuals =
                DVector::from_fn(n, |row, _| observed[row] - predicted[row]);
            let normal = jacobian.transpose() * &jacobian;
            let gradient = jacobian.transpose() * residuals;

            let mut damped = normal.clone();
            for i in 0..k {
                damped[(i, i)] += damping * normal[(i, i)].max(1e-12);
            }

            let step = match damped.clone().cholesky() {
                Some(chol) => chol.solve(&gradient),
                None => damped.lu().solve(&gradient).ok_or(FitError::Singular)?,
            };

            // A negligible step means the iteration is at a stationary
            // point and no further progress is possible.
            let scale = 1.0 + parameters.iter().map(|p| p * p).sum::<f64>().sqrt();
            if step.norm() <= 1e-12 * scale {
                return Ok(FitOutcome {
                    parameters,
                    converged: true,
                });
            }

            let candidate: Vec<f64> = parameters
                .iter()
                .zip(step.iter())
                .map(|(p, d)| p + d)
                .collect();
            let candidate_predicted = model(&candidate);

            match residual_cost(observed, &candidate_predicted) {
                Ok(candidate_cost) if candidate_cost < cost => {
                    let improvement = (cost - candidate_cost) / cost;
                    parameters = candidate;
                    predicted = candidate_predicted;
                    cost = candidate_cost;
                    damping = (damping * 0.1).max(1e-12);
                    if cost <= cost_floor || improvement < self.tolerance {
                        return Ok(FitOutcome {
                            parameters,
                            converged: true,
                        });
                    }
                }
                _ => {
                    // Rejected step: increase damping and retry.
                    damping *= 10.0;
                    if damping > 1e12 {
                        return Ok(FitOutcome {
                            parameters,
                            converged: false,
                        });
                    }
                }
            }
        }

        Ok(FitOutcome {
            parameters,
            converged: false,
        })
    }
}

/// Solve `design * x = observed` in the least-squares sense.
pub fn solve_least_squares(
    design: &DMatrix<f64>,
    observed: &DVector<f64>,
) -> Result<DVector<f64>, FitError> {
    if observed.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    let svd = design.clone().svd(true, true);
    let solution = svd.solve(observed, 1e-12).map_err(|_| FitError::Singular)?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    Ok(solution)
}

/// Cumulative trapezoidal integral of `y` over `t`, starting at zero.
pub fn cumulative_trapezoid(t: &[f64], y: &[f64]) -> Vec<f64> {
    debug_assert_eq!(t.len(), y.len());
    let mut out = vec![0.0; y.len()];
    for k in 1..y.len() {
        out[k] = out[k - 1] + 0.5 * (y[k] + y[k - 1]) * (t[k] - t[k - 1]);
    }
    out
}

fn residual_cost(observed: &[f64], predicted: &[f64]) -> Result<f64, FitError> {
    let mut cost = 0.0;
    for (o, p) in observed.iter().zip(predicted.iter()) {
        let r = o - p;
        cost += r * r;
    }
    if cost.is_finite() {
        Ok(cost)
    } else {
        Err(FitError::NonFinite)
    }
}
