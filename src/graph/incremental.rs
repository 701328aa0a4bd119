//! Incremental optimizer driver.
//!
//! Owns the cumulative factor arena and estimate across keyframes. Each
//! `update` merges the staged factors and new variable estimates, then
//! refines with bounded damped Gauss-Newton, relinearizing on demand: a
//! refinement pass runs when the skip counter fires or any variable has
//! drifted past the relinearization threshold since its last linearization
//! point. The first update can seed the estimate with a full batch
//! Levenberg-Marquardt pass.

use crate::core::math::normalize_angle;

use super::factor::Factor;
use super::optimizer::{LmConfig, LmOptimizer};
use super::store::FactorStore;
use super::values::{Value, Values};

/// Incremental solver parameters.
#[derive(Debug, Clone)]
pub struct IncrementalParams {
    /// Per-variable drift that forces relinearization.
    pub relinearize_threshold: f64,
    /// Updates between unconditional relinearizations.
    pub relinearize_skip: u32,
    /// Iteration budget of one refinement pass.
    pub refine_iterations: u32,
    /// Seed the first update with a batch Levenberg-Marquardt pass.
    pub batch_seed: bool,
}

impl Default for IncrementalParams {
    fn default() -> Self {
        Self {
            relinearize_threshold: 0.1,
            relinearize_skip: 1,
            refine_iterations: 10,
            batch_seed: true,
        }
    }
}

/// Persistent incremental optimizer.
#[derive(Debug)]
pub struct IncrementalOptimizer {
    params: IncrementalParams,
    graph: FactorStore,
    estimate: Values,
    linearization: Values,
    seeded: bool,
    updates_since_relin: u32,
}

impl IncrementalOptimizer {
    /// Create an empty solver.
    pub fn new(params: IncrementalParams) -> Self {
        Self {
            params,
            graph: FactorStore::new(),
            estimate: Values::new(),
            linearization: Values::new(),
            seeded: false,
            updates_since_relin: 0,
        }
    }

    /// Current estimate for every variable ever added.
    pub fn estimate(&self) -> &Values {
        &self.estimate
    }

    /// Cumulative factor store.
    pub fn graph(&self) -> &FactorStore {
        &self.graph
    }

    /// Whether the batch seed has already run.
    pub fn seeded(&self) -> bool {
        self.seeded
    }

    /// Push staged factors and new variable estimates, then refine.
    ///
    /// Estimates for variables the solver already knows are ignored; the
    /// solver's own iterate wins.
    pub fn update(&mut self, new_factors: Vec<Factor>, new_values: &Values) {
        let mut added_variable = false;
        for (key, value) in new_values.iter() {
            if !self.estimate.contains(key) {
                self.estimate.insert(*key, *value);
                added_variable = true;
            }
        }
        let added_factors = !new_factors.is_empty();
        for factor in new_factors {
            self.graph.add(factor);
        }

        if !self.seeded {
            self.seeded = true;
            if self.params.batch_seed {
                let optimizer = LmOptimizer::default();
                let (result, report) = optimizer.optimize(&self.graph, &self.estimate);
                log::debug!(
                    "incremental seed: {} iterations, chi2 {:.3e} -> {:.3e}",
                    report.iterations,
                    report.initial_error,
                    report.final_error
                );
                self.estimate = result;
                self.linearization = self.estimate.clone();
                return;
            }
        }

        self.updates_since_relin += 1;
        let due = self.updates_since_relin >= self.params.relinearize_skip;
        if !(added_factors || added_variable || due || self.drifted()) {
            return;
        }

        let optimizer = LmOptimizer::new(LmConfig {
            max_iterations: self.params.refine_iterations,
            ..LmConfig::default()
        });
        let (result, _) = optimizer.optimize(&self.graph, &self.estimate);
        self.estimate = result;
        self.linearization = self.estimate.clone();
        self.updates_since_relin = 0;
    }

    /// Whether any variable drifted past the relinearization threshold
    /// since its last linearization point.
    fn drifted(&self) -> bool {
        for (key, value) in self.estimate.iter() {
            let drift = match value {
                Value::Pose(p) => match self.linearization.pose(key) {
                    Some(lin) => ((p.x - lin.x).abs())
                        .max((p.y - lin.y).abs())
                        .max(normalize_angle(p.theta - lin.theta).abs()),
                    None => return true,
                },
                Value::Point(p) => match self.linearization.point(key) {
                    Some(lin) => (p.x - lin.x).abs().max((p.y - lin.y).abs()),
                    None => return true,
                },
            };
            if drift as f64 > self.params.relinearize_threshold {
                return true;
            }
        }
        false
    }
}
