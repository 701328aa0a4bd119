//! Top-level configuration: loading, defaults, validation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SlamError;

use super::noise::NoiseSection;
use super::sections::{
    BootstrapSection, CameraEntry, FramesSection, KeyframeSection, LandmarkSection,
    LoopClosureSection, OptimizerSection, OutlierSection, PersistenceSection, PruningSection,
    SmoothingSection, StationarySection,
};

/// Full back-end configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DrishtiConfig {
    #[serde(default)]
    pub frames: FramesSection,

    #[serde(default)]
    pub noise_models: NoiseSection,

    #[serde(default)]
    pub stationary: StationarySection,

    #[serde(default)]
    pub keyframe: KeyframeSection,

    #[serde(default)]
    pub optimizer: OptimizerSection,

    #[serde(default)]
    pub pruning: PruningSection,

    #[serde(default)]
    pub bootstrap: BootstrapSection,

    #[serde(default)]
    pub loop_closure: LoopClosureSection,

    #[serde(default)]
    pub outlier: OutlierSection,

    #[serde(default)]
    pub smoothing: SmoothingSection,

    #[serde(default)]
    pub landmarks: LandmarkSection,

    #[serde(default)]
    pub persistence: PersistenceSection,

    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
}

impl DrishtiConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, SlamError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SlamError> {
        serde_yaml::from_str(yaml).map_err(|e| SlamError::Config(e.to_string()))
    }

    /// Startup validation. Any violation here is fatal.
    pub fn validate(&self) -> Result<(), SlamError> {
        self.noise_models.validate()?;

        if self.stationary.position_threshold < 0.0 || self.stationary.rotation_threshold < 0.0 {
            return Err(SlamError::Config(
                "stationary thresholds must be non-negative".into(),
            ));
        }
        if self.keyframe.enabled
            && (self.keyframe.distance_threshold <= 0.0 || self.keyframe.rotation_threshold <= 0.0)
        {
            return Err(SlamError::Config(
                "keyframe thresholds must be strictly positive".into(),
            ));
        }
        if self.optimizer.add_to_graph_threshold <= 0.0 {
            return Err(SlamError::Config(
                "add_to_graph_threshold must be strictly positive".into(),
            ));
        }
        if self.pruning.enabled && self.pruning.max_poses == 0 {
            return Err(SlamError::Config("pruning.max_poses must be >= 1".into()));
        }
        if self.bootstrap.enabled {
            if self.bootstrap.particles == 0 {
                return Err(SlamError::Config("bootstrap.particles must be >= 1".into()));
            }
            if self.bootstrap.wait_time <= 0.0 {
                return Err(SlamError::Config(
                    "bootstrap.wait_time must be strictly positive".into(),
                ));
            }
            if self.bootstrap.range_variance <= 0.0 || self.bootstrap.bearing_variance <= 0.0 {
                return Err(SlamError::Config(
                    "bootstrap variances must be strictly positive".into(),
                ));
            }
        }
        if self.loop_closure.enabled && self.loop_closure.required_reobserved == 0 {
            return Err(SlamError::Config(
                "loop_closure.required_reobserved must be >= 1".into(),
            ));
        }
        if self.smoothing.enabled && self.smoothing.window == 0 {
            return Err(SlamError::Config("smoothing.window must be >= 1".into()));
        }
        if self.landmarks.total_tags == 0 {
            return Err(SlamError::Config("landmarks.total_tags must be >= 1".into()));
        }
        for camera in &self.cameras {
            if camera.name.is_empty() || camera.topic.is_empty() || camera.frame.is_empty() {
                return Err(SlamError::Config(format!(
                    "camera entry incomplete: name='{}' topic='{}' frame='{}'",
                    camera.name, camera.topic, camera.frame
                )));
            }
        }
        Ok(())
    }
}
