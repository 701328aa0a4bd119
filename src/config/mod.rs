//! Sectioned YAML configuration with built-in defaults.
//!
//! ```yaml
//! noise_models:
//!   odometry: [0.05, 0.05, 0.02]
//!   bearing_range: [0.1, 0.2]
//!
//! keyframe:
//!   distance_threshold: 0.5
//!   rotation_threshold: 0.5
//!
//! cameras:
//!   - name: front
//!     topic: /front/tag_detections
//!     frame: cam_front
//! ```

mod drishti;
mod noise;
mod sections;

pub use drishti::DrishtiConfig;
pub use noise::NoiseSection;
pub use sections::{
    BootstrapSection, CameraEntry, FramesSection, KeyframeSection, LandmarkSection,
    LoopClosureSection, OptimizerSection, OutlierSection, PersistenceSection, PruningSection,
    SmoothingSection, StationarySection,
};
