//! Dense linear-system assembly shared by the batch and incremental solvers.
//!
//! Variables are laid out in key order (poses then landmarks); each factor's
//! whitened Jacobian blocks contribute `JᵀJ` to the Hessian approximation
//! and `Jᵀr` to the gradient. The system is solved with dense Cholesky, in
//! f64 throughout.

use std::collections::BTreeMap;

use crate::core::math::normalize_angle;
use crate::core::types::{Point2D, Pose2D};

use super::store::FactorStore;
use super::values::{Value, Values};
use super::Key;

/// Column layout of the linear system: key → (offset, dimension).
#[derive(Debug, Clone)]
pub struct VariableOrdering {
    offsets: BTreeMap<Key, (usize, usize)>,
    dim: usize,
}

impl VariableOrdering {
    /// Build the ordering from the estimate store.
    pub fn from_values(values: &Values) -> Self {
        let mut offsets = BTreeMap::new();
        let mut dim = 0;
        for (key, value) in values.iter() {
            let var_dim = match value {
                Value::Pose(_) => 3,
                Value::Point(_) => 2,
            };
            offsets.insert(*key, (dim, var_dim));
            dim += var_dim;
        }
        Self { offsets, dim }
    }

    /// Total problem dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Offset and dimension of a variable.
    pub fn offset(&self, key: &Key) -> Option<(usize, usize)> {
        self.offsets.get(key).copied()
    }
}

/// Assemble the normal equations `H dx = -g` from the live factors.
///
/// Returns `(h, g)` with `h` a dense row-major `dim × dim` matrix and `g`
/// the gradient `Σ Jᵀ r`. Factors referencing variables absent from the
/// ordering are skipped.
pub fn build_system(
    graph: &FactorStore,
    values: &Values,
    ordering: &VariableOrdering,
) -> (Vec<f64>, Vec<f64>) {
    let dim = ordering.dim();
    let mut h = vec![0.0; dim * dim];
    let mut g = vec![0.0; dim];

    for (_, factor) in graph.iter() {
        let Some(lin) = factor.linearize(values) else {
            continue;
        };
        let rows = lin.residual.len();

        let mut placed = Vec::with_capacity(lin.blocks.len());
        let mut all_known = true;
        for block in &lin.blocks {
            match ordering.offset(&block.key) {
                Some(layout) => placed.push((layout, &block.jacobian)),
                None => {
                    all_known = false;
                    break;
                }
            }
        }
        if !all_known {
            continue;
        }

        for ((off_a, dim_a), ja) in &placed {
            // g_a += Jaᵀ r
            for col in 0..*dim_a {
                let mut sum = 0.0;
                for row in 0..rows {
                    sum += ja[row * dim_a + col] * lin.residual[row];
                }
                g[off_a + col] += sum;
            }
            // H_ab += Jaᵀ Jb for every block pair
            for ((off_b, dim_b), jb) in &placed {
                for ca in 0..*dim_a {
                    for cb in 0..*dim_b {
                        let mut sum = 0.0;
                        for row in 0..rows {
                            sum += ja[row * dim_a + ca] * jb[row * dim_b + cb];
                        }
                        h[(off_a + ca) * dim + off_b + cb] += sum;
                    }
                }
            }
        }
    }

    (h, g)
}

/// Solve `H x = b` with dense Cholesky. Returns `None` when `H` is not
/// positive definite.
pub fn cholesky_solve(h: &[f64], b: &[f64], dim: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; dim * dim];

    for i in 0..dim {
        for j in 0..=i {
            let mut sum = h[i * dim + j];
            for k in 0..j {
                sum -= l[i * dim + k] * l[j * dim + k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i * dim + j] = sum.sqrt();
            } else {
                l[i * dim + j] = sum / l[j * dim + j];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = vec![0.0; dim];
    for i in 0..dim {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * dim + j] * y[j];
        }
        y[i] = sum / l[i * dim + i];
    }

    // Backward substitution: Lᵀ x = y
    let mut x = vec![0.0; dim];
    for i in (0..dim).rev() {
        let mut sum = y[i];
        for j in (i + 1)..dim {
            sum -= l[j * dim + i] * x[j];
        }
        x[i] = sum / l[i * dim + i];
    }

    Some(x)
}

/// Apply a step to the estimates, wrapping pose orientations.
pub fn apply_step(values: &mut Values, ordering: &VariableOrdering, dx: &[f64]) {
    let updates: Vec<(Key, Value)> = values
        .iter()
        .filter_map(|(key, value)| {
            let (offset, dim) = ordering.offset(key)?;
            if offset + dim > dx.len() {
                return None;
            }
            let updated = match value {
                Value::Pose(p) => Value::Pose(Pose2D::new(
                    p.x + dx[offset] as f32,
                    p.y + dx[offset + 1] as f32,
                    normalize_angle(p.theta + dx[offset + 2] as f32),
                )),
                Value::Point(p) => Value::Point(Point2D::new(
                    p.x + dx[offset] as f32,
                    p.y + dx[offset + 1] as f32,
                )),
            };
            Some((*key, updated))
        })
        .collect();

    for (key, value) in updates {
        values.update(key, value);
    }
}

/// Whitened chi-squared error over all live factors.
pub fn chi_squared(graph: &FactorStore, values: &Values) -> f64 {
    let mut chi2 = 0.0;
    for (_, factor) in graph.iter() {
        let Some(mut error) = factor.unwhitened_error(values) else {
            continue;
        };
        factor.noise().whiten(&mut error);
        chi2 += error.iter().map(|e| e * e).sum::<f64>();
    }
    chi2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::factor::Factor;
    use crate::graph::noise::DiagonalNoise;
    use approx::assert_relative_eq;

    #[test]
    fn test_ordering_layout() {
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::identity()));
        values.insert(Key::Pose(2), Value::Pose(Pose2D::identity()));
        values.insert(Key::Landmark(0), Value::Point(Point2D::default()));

        let ordering = VariableOrdering::from_values(&values);
        assert_eq!(ordering.dim(), 8);
        assert_eq!(ordering.offset(&Key::Pose(1)), Some((0, 3)));
        assert_eq!(ordering.offset(&Key::Pose(2)), Some((3, 3)));
        assert_eq!(ordering.offset(&Key::Landmark(0)), Some((6, 2)));
    }

    #[test]
    fn test_cholesky_identity() {
        let h = vec![1.0, 0.0, 0.0, 1.0];
        let b = vec![3.0, -2.0];
        let x = cholesky_solve(&h, &b, 2).unwrap();
        assert_relative_eq!(x[0], 3.0);
        assert_relative_eq!(x[1], -2.0);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let h = vec![0.0, 0.0, 0.0, -1.0];
        assert!(cholesky_solve(&h, &[1.0, 1.0], 2).is_none());
    }

    #[test]
    fn test_chi_squared_zero_for_consistent_graph() {
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::identity()));
        values.insert(Key::Pose(2), Value::Pose(Pose2D::new(1.0, 0.0, 0.0)));

        let mut graph = FactorStore::new();
        graph.add(Factor::Between {
            from: Key::Pose(1),
            to: Key::Pose(2),
            delta: Pose2D::new(1.0, 0.0, 0.0),
            noise: DiagonalNoise::from_sigmas(&[0.1, 0.1, 0.1]),
        });

        assert_relative_eq!(chi_squared(&graph, &values), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_prior_step_converges_in_one_solve() {
        // One prior on one pose: the GN step lands exactly on the prior.
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::new(0.5, -0.5, 0.1)));

        let mut graph = FactorStore::new();
        graph.add(Factor::PriorPose {
            key: Key::Pose(1),
            prior: Pose2D::identity(),
            noise: DiagonalNoise::from_sigmas(&[0.1, 0.1, 0.1]),
        });

        let ordering = VariableOrdering::from_values(&values);
        let (h, g) = build_system(&graph, &values, &ordering);
        let step = cholesky_solve(&h, &g, ordering.dim()).unwrap();
        let dx: Vec<f64> = step.iter().map(|v| -v).collect();
        apply_step(&mut values, &ordering, &dx);

        let pose = values.pose(&Key::Pose(1)).unwrap();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(pose.theta, 0.0, epsilon = 1e-5);
    }
}
