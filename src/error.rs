//! Error types for the SLAM back end.
//!
//! Startup conditions (configuration, static transforms, persistence files)
//! are fatal and surface as `SlamError`. Everything recoverable on the
//! odometry/detection stream is handled locally with diagnostics only.

use thiserror::Error;

/// Errors that can occur in the SLAM back end.
#[derive(Error, Debug)]
pub enum SlamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("No static transform from {robot_frame} to {camera_frame} after {attempts} attempts")]
    MissingTransform {
        robot_frame: String,
        camera_frame: String,
        attempts: u32,
    },

    #[error("Degenerate extrinsic for camera {0}: optical axis has no ground-plane projection")]
    DegenerateExtrinsic(String),
}

pub type Result<T> = std::result::Result<T, SlamError>;
