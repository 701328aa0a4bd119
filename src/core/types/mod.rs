//! Core value types shared across the crate.

mod odometry;
mod pose;

pub use odometry::OdometrySample;
pub use pose::{Point2D, Pose2D};
