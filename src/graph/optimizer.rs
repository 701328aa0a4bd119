//! Batch Levenberg-Marquardt over the factor graph.
//!
//! Minimizes the whitened squared error `Σ ‖J dx + r‖²` by repeatedly
//! solving the damped normal equations. Damping goes up when a step
//! increases the error (and the step is reverted), down on success.

use super::linear::{apply_step, build_system, chi_squared, cholesky_solve, VariableOrdering};
use super::store::FactorStore;
use super::values::Values;

/// Reason the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Relative error change fell below threshold.
    Converged,
    /// Iteration budget exhausted.
    MaxIterations,
    /// Damping grew past its ceiling without a successful step.
    Diverged,
    /// The damped system could not be factorized.
    SolveFailed,
    /// Nothing to optimize.
    EmptyGraph,
}

/// Summary of one batch solve.
#[derive(Debug, Clone)]
pub struct OptimizationReport {
    /// Iterations performed.
    pub iterations: u32,
    /// Chi-squared before the first step.
    pub initial_error: f64,
    /// Chi-squared at exit.
    pub final_error: f64,
    /// Whether the run converged.
    pub converged: bool,
    /// Why the run stopped.
    pub reason: StopReason,
}

/// Levenberg-Marquardt configuration.
#[derive(Debug, Clone)]
pub struct LmConfig {
    /// Maximum iterations per solve.
    pub max_iterations: u32,
    /// Relative error-change threshold for convergence.
    pub convergence_threshold: f64,
    /// Initial damping factor λ.
    pub damping_factor: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_threshold: 1e-6,
            damping_factor: 1e-3,
        }
    }
}

/// Batch Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LmOptimizer {
    config: LmConfig,
}

impl LmOptimizer {
    /// Create with the given configuration.
    pub fn new(config: LmConfig) -> Self {
        Self { config }
    }

    /// Optimize a copy of `initial` against `graph`.
    ///
    /// Non-convergence is not an error: the returned values are the best
    /// iterate reached, and the report says why the run stopped.
    pub fn optimize(&self, graph: &FactorStore, initial: &Values) -> (Values, OptimizationReport) {
        let mut values = initial.clone();

        if graph.is_empty() || values.is_empty() {
            return (
                values,
                OptimizationReport {
                    iterations: 0,
                    initial_error: 0.0,
                    final_error: 0.0,
                    converged: true,
                    reason: StopReason::EmptyGraph,
                },
            );
        }

        let ordering = VariableOrdering::from_values(&values);
        let dim = ordering.dim();

        let initial_error = chi_squared(graph, &values);
        let mut current_error = initial_error;
        let mut lambda = self.config.damping_factor;
        let mut iterations = 0;

        for iter in 0..self.config.max_iterations {
            iterations = iter + 1;

            let (h, g) = build_system(graph, &values, &ordering);
            let h_damped = damp(&h, lambda, dim);

            let step = match cholesky_solve(&h_damped, &g, dim) {
                Some(step) => step,
                None => {
                    return (
                        values,
                        OptimizationReport {
                            iterations,
                            initial_error,
                            final_error: current_error,
                            converged: false,
                            reason: StopReason::SolveFailed,
                        },
                    );
                }
            };
            let dx: Vec<f64> = step.iter().map(|v| -v).collect();
            apply_step(&mut values, &ordering, &dx);

            let new_error = chi_squared(graph, &values);
            if new_error > current_error * 1.1 {
                // Revert and raise damping.
                let back: Vec<f64> = dx.iter().map(|v| -v).collect();
                apply_step(&mut values, &ordering, &back);
                lambda *= 10.0;
                if lambda > 1e10 {
                    return (
                        values,
                        OptimizationReport {
                            iterations,
                            initial_error,
                            final_error: current_error,
                            converged: false,
                            reason: StopReason::Diverged,
                        },
                    );
                }
                continue;
            }

            lambda = (lambda * 0.1).max(1e-10);

            let relative_change = (current_error - new_error).abs() / current_error.max(1e-10);
            current_error = new_error;

            if relative_change < self.config.convergence_threshold {
                return (
                    values,
                    OptimizationReport {
                        iterations,
                        initial_error,
                        final_error: current_error,
                        converged: true,
                        reason: StopReason::Converged,
                    },
                );
            }
        }

        (
            values,
            OptimizationReport {
                iterations,
                initial_error,
                final_error: current_error,
                converged: false,
                reason: StopReason::MaxIterations,
            },
        )
    }
}

/// Add λ·max(diag, 1) to the diagonal.
fn damp(h: &[f64], lambda: f64, dim: usize) -> Vec<f64> {
    let mut damped = h.to_vec();
    for i in 0..dim {
        damped[i * dim + i] += lambda * damped[i * dim + i].max(1.0);
    }
    damped
}
