//! Raw odometry samples as delivered by the host transport.

use super::Pose2D;

/// One wheel-odometry message: timestamp, 3D position, orientation quaternion.
///
/// The back end works purely in SE(2); `to_pose2` projects the sample onto
/// the ground plane.
#[derive(Debug, Clone, Copy)]
pub struct OdometrySample {
    /// Timestamp in seconds.
    pub stamp: f64,
    /// Position (x, y, z) in meters.
    pub position: [f32; 3],
    /// Orientation quaternion (x, y, z, w).
    pub orientation: [f32; 4],
}

impl OdometrySample {
    /// Create a sample that is already planar.
    pub fn planar(stamp: f64, x: f32, y: f32, yaw: f32) -> Self {
        let half = yaw * 0.5;
        Self {
            stamp,
            position: [x, y, 0.0],
            orientation: [0.0, 0.0, half.sin(), half.cos()],
        }
    }

    /// Project to (x, y, yaw) via the standard quaternion-to-Euler yaw.
    pub fn to_pose2(&self) -> Pose2D {
        let [qx, qy, qz, qw] = self.orientation;
        let siny_cosp = 2.0 * (qw * qz + qx * qy);
        let cosy_cosp = 1.0 - 2.0 * (qy * qy + qz * qz);
        let yaw = siny_cosp.atan2(cosy_cosp);
        Pose2D::new(self.position[0], self.position[1], yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_planar_roundtrip() {
        let sample = OdometrySample::planar(1.5, 2.0, -0.5, FRAC_PI_2);
        let pose = sample.to_pose2();
        assert_relative_eq!(pose.x, 2.0);
        assert_relative_eq!(pose.y, -0.5);
        assert_relative_eq!(pose.theta, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_identity_quaternion() {
        let sample = OdometrySample {
            stamp: 0.0,
            position: [1.0, 2.0, 0.3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        };
        let pose = sample.to_pose2();
        assert_relative_eq!(pose.theta, 0.0);
    }
}
