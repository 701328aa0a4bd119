//! Noise-model configuration section.

use serde::{Deserialize, Serialize};

use crate::error::SlamError;
use crate::graph::{DiagonalNoise, NoiseModels};

/// Noise sigmas for every factor kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseSection {
    /// Between-factor sigmas (x, y, θ).
    #[serde(default = "default_odometry")]
    pub odometry: [f32; 3],

    /// Pose prior sigmas (x, y, θ).
    #[serde(default = "default_prior")]
    pub prior: [f32; 3],

    /// Observation sigmas (bearing, range).
    #[serde(default = "default_bearing_range")]
    pub bearing_range: [f32; 2],

    /// Landmark prior sigmas (x, y).
    #[serde(default = "default_point")]
    pub point: [f32; 2],

    /// Loop-closure between-factor sigmas (x, y, θ).
    #[serde(default = "default_loop_closure")]
    pub loop_closure: [f32; 3],
}

fn default_odometry() -> [f32; 3] {
    [0.05, 0.05, 0.02]
}

fn default_prior() -> [f32; 3] {
    [0.01, 0.01, 0.01]
}

fn default_bearing_range() -> [f32; 2] {
    [0.1, 0.2]
}

fn default_point() -> [f32; 2] {
    [0.1, 0.1]
}

fn default_loop_closure() -> [f32; 3] {
    [0.1, 0.1, 0.05]
}

impl Default for NoiseSection {
    fn default() -> Self {
        Self {
            odometry: default_odometry(),
            prior: default_prior(),
            bearing_range: default_bearing_range(),
            point: default_point(),
            loop_closure: default_loop_closure(),
        }
    }
}

impl NoiseSection {
    /// All sigmas must be strictly positive.
    pub fn validate(&self) -> Result<(), SlamError> {
        let all = self
            .odometry
            .iter()
            .chain(&self.prior)
            .chain(&self.bearing_range)
            .chain(&self.point)
            .chain(&self.loop_closure);
        for sigma in all {
            if !(*sigma > 0.0) {
                return Err(SlamError::Config(format!(
                    "noise sigma must be strictly positive, got {}",
                    sigma
                )));
            }
        }
        Ok(())
    }

    /// Build the runtime noise registry.
    pub fn to_models(&self) -> NoiseModels {
        NoiseModels {
            odometry: DiagonalNoise::from_sigmas(&self.odometry),
            prior: DiagonalNoise::from_sigmas(&self.prior),
            bearing_range: DiagonalNoise::from_sigmas(&self.bearing_range),
            point: DiagonalNoise::from_sigmas(&self.point),
            loop_closure: DiagonalNoise::from_sigmas(&self.loop_closure),
        }
    }
}
