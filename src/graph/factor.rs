//! Factor kinds and their residual / linearization functions.
//!
//! Factors are a tagged variant rather than a trait hierarchy; each case
//! carries its measurement and diagonal noise and knows how to compute its
//! unwhitened residual and its whitened Jacobian blocks at a linearization
//! point.

use crate::core::math::normalize_angle;
use crate::core::types::{Point2D, Pose2D};

use super::noise::DiagonalNoise;
use super::values::Values;
use super::Key;

/// A constraint in the factor graph.
#[derive(Debug, Clone)]
pub enum Factor {
    /// Unary Gaussian anchor on a pose.
    PriorPose {
        key: Key,
        prior: Pose2D,
        noise: DiagonalNoise,
    },
    /// Unary Gaussian anchor on a landmark point.
    PriorPoint {
        key: Key,
        prior: Point2D,
        noise: DiagonalNoise,
    },
    /// Relative-pose constraint from odometry.
    Between {
        from: Key,
        to: Key,
        delta: Pose2D,
        noise: DiagonalNoise,
    },
    /// Bearing-range observation of a landmark from a pose.
    BearingRange {
        pose: Key,
        landmark: Key,
        bearing: f32,
        range: f32,
        noise: DiagonalNoise,
    },
    /// Relative-pose constraint from a detected loop closure.
    LoopClosure {
        from: Key,
        to: Key,
        delta: Pose2D,
        noise: DiagonalNoise,
    },
}

/// One whitened Jacobian block of a linearized factor.
#[derive(Debug, Clone)]
pub struct LinearBlock {
    /// Variable this block differentiates against.
    pub key: Key,
    /// Row-major (factor dim × variable dim) Jacobian.
    pub jacobian: Vec<f64>,
}

/// A factor linearized at the current estimate, already whitened.
#[derive(Debug, Clone)]
pub struct LinearizedFactor {
    /// Jacobian blocks, one per referenced variable.
    pub blocks: Vec<LinearBlock>,
    /// Whitened residual.
    pub residual: Vec<f64>,
}

impl Factor {
    /// Variables referenced by this factor.
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Factor::PriorPose { key, .. } | Factor::PriorPoint { key, .. } => vec![*key],
            Factor::Between { from, to, .. } | Factor::LoopClosure { from, to, .. } => {
                vec![*from, *to]
            }
            Factor::BearingRange { pose, landmark, .. } => vec![*pose, *landmark],
        }
    }

    /// Residual dimension.
    pub fn dim(&self) -> usize {
        self.noise().dim()
    }

    /// The factor's noise model.
    pub fn noise(&self) -> &DiagonalNoise {
        match self {
            Factor::PriorPose { noise, .. }
            | Factor::PriorPoint { noise, .. }
            | Factor::Between { noise, .. }
            | Factor::BearingRange { noise, .. }
            | Factor::LoopClosure { noise, .. } => noise,
        }
    }

    /// Whether this is a prior on the given key.
    pub fn is_prior_on(&self, target: &Key) -> bool {
        match self {
            Factor::PriorPose { key, .. } | Factor::PriorPoint { key, .. } => key == target,
            _ => false,
        }
    }

    /// Unwhitened residual at the given estimates.
    ///
    /// Returns `None` when a referenced variable has no estimate; callers
    /// treat that as "skip this factor".
    pub fn unwhitened_error(&self, values: &Values) -> Option<Vec<f64>> {
        match self {
            Factor::PriorPose { key, prior, .. } => {
                let p = values.pose(key)?;
                Some(vec![
                    (p.x - prior.x) as f64,
                    (p.y - prior.y) as f64,
                    normalize_angle(p.theta - prior.theta) as f64,
                ])
            }
            Factor::PriorPoint { key, prior, .. } => {
                let p = values.point(key)?;
                Some(vec![(p.x - prior.x) as f64, (p.y - prior.y) as f64])
            }
            Factor::Between { from, to, delta, .. }
            | Factor::LoopClosure { from, to, delta, .. } => {
                let xi = values.pose(from)?;
                let xj = values.pose(to)?;
                let predicted = xi.between(&xj);
                Some(vec![
                    (predicted.x - delta.x) as f64,
                    (predicted.y - delta.y) as f64,
                    normalize_angle(predicted.theta - delta.theta) as f64,
                ])
            }
            Factor::BearingRange {
                pose,
                landmark,
                bearing,
                range,
                ..
            } => {
                let x = values.pose(pose)?;
                let l = values.point(landmark)?;
                let local = x.inverse_transform_point(&l);
                Some(vec![
                    normalize_angle(local.bearing() - bearing) as f64,
                    (local.norm() - range) as f64,
                ])
            }
        }
    }

    /// Linearize at the current estimates, returning whitened blocks.
    pub fn linearize(&self, values: &Values) -> Option<LinearizedFactor> {
        let mut residual = self.unwhitened_error(values)?;
        let mut blocks = match self {
            Factor::PriorPose { key, .. } => {
                let jacobian = vec![
                    1.0, 0.0, 0.0, //
                    0.0, 1.0, 0.0, //
                    0.0, 0.0, 1.0,
                ];
                vec![LinearBlock { key: *key, jacobian }]
            }
            Factor::PriorPoint { key, .. } => {
                let jacobian = vec![
                    1.0, 0.0, //
                    0.0, 1.0,
                ];
                vec![LinearBlock { key: *key, jacobian }]
            }
            Factor::Between { from, to, .. } | Factor::LoopClosure { from, to, .. } => {
                let xi = values.pose(from)?;
                let xj = values.pose(to)?;
                let (ji, jj) = between_jacobians(&xi, &xj);
                vec![
                    LinearBlock {
                        key: *from,
                        jacobian: ji,
                    },
                    LinearBlock {
                        key: *to,
                        jacobian: jj,
                    },
                ]
            }
            Factor::BearingRange { pose, landmark, .. } => {
                let x = values.pose(pose)?;
                let l = values.point(landmark)?;
                let (jp, jl) = bearing_range_jacobians(&x, &l)?;
                vec![
                    LinearBlock {
                        key: *pose,
                        jacobian: jp,
                    },
                    LinearBlock {
                        key: *landmark,
                        jacobian: jl,
                    },
                ]
            }
        };

        // Whiten residual and Jacobian rows by the per-dimension sigmas.
        let sigmas = self.noise().sigmas();
        self.noise().whiten(&mut residual);
        for block in &mut blocks {
            let cols = block.jacobian.len() / sigmas.len();
            for (row, sigma) in sigmas.iter().enumerate() {
                for col in 0..cols {
                    block.jacobian[row * cols + col] /= *sigma as f64;
                }
            }
        }

        Some(LinearizedFactor { blocks, residual })
    }
}

/// Jacobians of the between error w.r.t. the two poses.
///
/// Error is `e = [R(θi)ᵀ(tj − ti) − z_t; wrap(θj − θi − z_θ)]`, matching
/// `unwhitened_error`.
fn between_jacobians(xi: &Pose2D, xj: &Pose2D) -> (Vec<f64>, Vec<f64>) {
    let cos_i = (xi.theta as f64).cos();
    let sin_i = (xi.theta as f64).sin();
    let dx = (xj.x - xi.x) as f64;
    let dy = (xj.y - xi.y) as f64;

    let ji = vec![
        -cos_i,
        -sin_i,
        -sin_i * dx + cos_i * dy,
        sin_i,
        -cos_i,
        -cos_i * dx - sin_i * dy,
        0.0,
        0.0,
        -1.0,
    ];
    let jj = vec![
        cos_i, sin_i, 0.0, //
        -sin_i, cos_i, 0.0, //
        0.0, 0.0, 1.0,
    ];
    (ji, jj)
}

/// Jacobians of the bearing-range error w.r.t. pose and landmark.
///
/// Returns `None` for a landmark coincident with the pose position, where
/// bearing is undefined.
fn bearing_range_jacobians(x: &Pose2D, l: &Point2D) -> Option<(Vec<f64>, Vec<f64>)> {
    let dx = (l.x - x.x) as f64;
    let dy = (l.y - x.y) as f64;
    let q = dx * dx + dy * dy;
    if q < 1e-12 {
        return None;
    }
    let r = q.sqrt();

    let jp = vec![
        dy / q,
        -dx / q,
        -1.0, //
        -dx / r,
        -dy / r,
        0.0,
    ];
    let jl = vec![
        -dy / q,
        dx / q, //
        dx / r,
        dy / r,
    ];
    Some((jp, jl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::values::Value;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn unit_noise(dim: usize) -> DiagonalNoise {
        DiagonalNoise::from_sigmas(&vec![1.0; dim])
    }

    #[test]
    fn test_between_error_zero_for_consistent_poses() {
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::identity()));
        values.insert(Key::Pose(2), Value::Pose(Pose2D::new(1.0, 0.0, 0.0)));

        let factor = Factor::Between {
            from: Key::Pose(1),
            to: Key::Pose(2),
            delta: Pose2D::new(1.0, 0.0, 0.0),
            noise: unit_noise(3),
        };
        let error = factor.unwhitened_error(&values).unwrap();
        for e in error {
            assert_relative_eq!(e, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_between_error_with_offset() {
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::identity()));
        values.insert(Key::Pose(2), Value::Pose(Pose2D::new(1.1, 0.1, 0.05)));

        let factor = Factor::Between {
            from: Key::Pose(1),
            to: Key::Pose(2),
            delta: Pose2D::new(1.0, 0.0, 0.0),
            noise: unit_noise(3),
        };
        let error = factor.unwhitened_error(&values).unwrap();
        assert_relative_eq!(error[0], 0.1, epsilon = 1e-5);
        assert_relative_eq!(error[1], 0.1, epsilon = 1e-5);
        assert_relative_eq!(error[2], 0.05, epsilon = 1e-5);
    }

    #[test]
    fn test_bearing_range_error() {
        // Robot at origin facing +x, landmark straight ahead at range 2.
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::identity()));
        values.insert(Key::Landmark(0), Value::Point(Point2D::new(2.0, 0.0)));

        let factor = Factor::BearingRange {
            pose: Key::Pose(1),
            landmark: Key::Landmark(0),
            bearing: 0.0,
            range: 2.0,
            noise: unit_noise(2),
        };
        let error = factor.unwhitened_error(&values).unwrap();
        assert_relative_eq!(error[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(error[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bearing_range_error_rotated_pose() {
        // Robot facing +y; landmark at (0, 3) is dead ahead.
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::new(0.0, 0.0, FRAC_PI_2)));
        values.insert(Key::Landmark(0), Value::Point(Point2D::new(0.0, 3.0)));

        let factor = Factor::BearingRange {
            pose: Key::Pose(1),
            landmark: Key::Landmark(0),
            bearing: 0.1,
            range: 3.5,
            noise: unit_noise(2),
        };
        let error = factor.unwhitened_error(&values).unwrap();
        assert_relative_eq!(error[0], -0.1, epsilon = 1e-5);
        assert_relative_eq!(error[1], -0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_prior_pose_error() {
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::new(0.2, -0.1, 0.05)));

        let factor = Factor::PriorPose {
            key: Key::Pose(1),
            prior: Pose2D::identity(),
            noise: unit_noise(3),
        };
        let error = factor.unwhitened_error(&values).unwrap();
        assert_relative_eq!(error[0], 0.2, epsilon = 1e-6);
        assert_relative_eq!(error[1], -0.1, epsilon = 1e-6);
        assert_relative_eq!(error[2], 0.05, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_variable_yields_none() {
        let values = Values::new();
        let factor = Factor::PriorPoint {
            key: Key::Landmark(0),
            prior: Point2D::default(),
            noise: unit_noise(2),
        };
        assert!(factor.unwhitened_error(&values).is_none());
    }

    #[test]
    fn test_whitening_scales_residual() {
        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(Pose2D::new(1.0, 0.0, 0.0)));

        let factor = Factor::PriorPose {
            key: Key::Pose(1),
            prior: Pose2D::identity(),
            noise: DiagonalNoise::from_sigmas(&[0.5, 0.5, 0.5]),
        };
        let lin = factor.linearize(&values).unwrap();
        assert_relative_eq!(lin.residual[0], 2.0, epsilon = 1e-6);
        // Jacobian diagonal scaled by 1/σ too
        assert_relative_eq!(lin.blocks[0].jacobian[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_jacobians_match_numeric_between() {
        let xi = Pose2D::new(0.4, -0.2, 0.3);
        let xj = Pose2D::new(1.2, 0.5, -0.1);
        let delta = Pose2D::new(0.7, 0.6, -0.4);
        let factor = Factor::Between {
            from: Key::Pose(1),
            to: Key::Pose(2),
            delta,
            noise: unit_noise(3),
        };

        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(xi));
        values.insert(Key::Pose(2), Value::Pose(xj));
        let lin = factor.linearize(&values).unwrap();

        // Numeric differentiation against each coordinate of xi.
        let eps = 1e-4f32;
        let base = factor.unwhitened_error(&values).unwrap();
        for coord in 0..3 {
            let mut perturbed = xi;
            match coord {
                0 => perturbed.x += eps,
                1 => perturbed.y += eps,
                _ => perturbed.theta += eps,
            }
            let mut v2 = values.clone();
            v2.update(Key::Pose(1), Value::Pose(perturbed));
            let shifted = factor.unwhitened_error(&v2).unwrap();
            for row in 0..3 {
                let numeric = (shifted[row] - base[row]) / eps as f64;
                let analytic = lin.blocks[0].jacobian[row * 3 + coord];
                assert_relative_eq!(numeric, analytic, epsilon = 2e-2);
            }
        }
    }

    #[test]
    fn test_jacobians_match_numeric_bearing_range() {
        let x = Pose2D::new(0.3, 0.1, 0.2);
        let l = Point2D::new(2.0, 1.5);
        let factor = Factor::BearingRange {
            pose: Key::Pose(1),
            landmark: Key::Landmark(0),
            bearing: 0.5,
            range: 2.0,
            noise: unit_noise(2),
        };

        let mut values = Values::new();
        values.insert(Key::Pose(1), Value::Pose(x));
        values.insert(Key::Landmark(0), Value::Point(l));
        let lin = factor.linearize(&values).unwrap();

        let eps = 1e-4f32;
        let base = factor.unwhitened_error(&values).unwrap();
        for coord in 0..2 {
            let mut perturbed = l;
            if coord == 0 {
                perturbed.x += eps;
            } else {
                perturbed.y += eps;
            }
            let mut v2 = values.clone();
            v2.update(Key::Landmark(0), Value::Point(perturbed));
            let shifted = factor.unwhitened_error(&v2).unwrap();
            for row in 0..2 {
                let numeric = (shifted[row] - base[row]) / eps as f64;
                let analytic = lin.blocks[1].jacobian[row * 2 + coord];
                assert_relative_eq!(numeric, analytic, epsilon = 2e-2);
            }
        }
    }
}
