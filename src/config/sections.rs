//! Configuration sections other than noise models.

use serde::{Deserialize, Serialize};

/// Topic and frame names used by the host transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramesSection {
    #[serde(default = "default_odom_topic")]
    pub odom_topic: String,
    #[serde(default = "default_odom_frame")]
    pub odom_frame: String,
    #[serde(default = "default_trajectory_topic")]
    pub trajectory_topic: String,
    #[serde(default = "default_map_frame")]
    pub map_frame_id: String,
    #[serde(default = "default_robot_frame")]
    pub robot_frame: String,
}

fn default_odom_topic() -> String {
    "/odom".into()
}
fn default_odom_frame() -> String {
    "odom".into()
}
fn default_trajectory_topic() -> String {
    "/trajectory".into()
}
fn default_map_frame() -> String {
    "map".into()
}
fn default_robot_frame() -> String {
    "base_link".into()
}

impl Default for FramesSection {
    fn default() -> Self {
        Self {
            odom_topic: default_odom_topic(),
            odom_frame: default_odom_frame(),
            trajectory_topic: default_trajectory_topic(),
            map_frame_id: default_map_frame(),
            robot_frame: default_robot_frame(),
        }
    }
}

/// Movement gate: odometry samples below both thresholds are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationarySection {
    /// Minimum position change in meters.
    #[serde(default = "default_stationary_position")]
    pub position_threshold: f32,
    /// Minimum rotation change in radians.
    #[serde(default = "default_stationary_rotation")]
    pub rotation_threshold: f32,
}

fn default_stationary_position() -> f32 {
    0.01
}
fn default_stationary_rotation() -> f32 {
    0.005
}

impl Default for StationarySection {
    fn default() -> Self {
        Self {
            position_threshold: default_stationary_position(),
            rotation_threshold: default_stationary_rotation(),
        }
    }
}

/// Keyframe gating thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeSection {
    /// When off, every surviving odometry sample is a keyframe.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Translation in meters that promotes a sample to a keyframe.
    #[serde(default = "default_keyframe_distance")]
    pub distance_threshold: f32,
    /// Rotation in radians that promotes a sample to a keyframe.
    #[serde(default = "default_keyframe_rotation")]
    pub rotation_threshold: f32,
}

fn default_keyframe_distance() -> f32 {
    0.5
}
fn default_keyframe_rotation() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

impl Default for KeyframeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            distance_threshold: default_keyframe_distance(),
            rotation_threshold: default_keyframe_rotation(),
        }
    }
}

/// Optimizer selection and residual gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSection {
    /// Incremental solver when true, full batch Levenberg-Marquardt when
    /// false.
    #[serde(default = "default_true")]
    pub use_isam2: bool,
    /// Seed the incremental solver with one batch pass on its first update.
    #[serde(default = "default_true")]
    pub batch_seed: bool,
    /// Unwhitened bearing-residual bound for adding an observation of a
    /// known landmark.
    #[serde(default = "default_add_threshold")]
    pub add_to_graph_threshold: f32,
}

fn default_add_threshold() -> f32 {
    0.3
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self {
            use_isam2: true,
            batch_seed: true,
            add_to_graph_threshold: default_add_threshold(),
        }
    }
}

/// Graph size bounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningSection {
    #[serde(default = "default_false")]
    pub enabled: bool,
    /// Maximum pose variables retained in the graph.
    #[serde(default = "default_max_poses")]
    pub max_poses: usize,
}

fn default_max_poses() -> usize {
    100
}

impl Default for PruningSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_poses: default_max_poses(),
        }
    }
}

/// Particle-filter bootstrap parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSection {
    #[serde(default = "default_false")]
    pub enabled: bool,
    /// Particle count.
    #[serde(default = "default_particles")]
    pub particles: usize,
    /// Collection window in seconds.
    #[serde(default = "default_wait_time")]
    pub wait_time: f64,
    /// Range likelihood variance.
    #[serde(default = "default_range_variance")]
    pub range_variance: f32,
    /// Bearing likelihood variance.
    #[serde(default = "default_bearing_variance")]
    pub bearing_variance: f32,
    /// RNG seed; 0 draws from entropy.
    #[serde(default)]
    pub seed: u64,
}

fn default_particles() -> usize {
    500
}
fn default_wait_time() -> f64 {
    5.0
}
fn default_range_variance() -> f32 {
    0.04
}
fn default_bearing_variance() -> f32 {
    0.01
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self {
            enabled: false,
            particles: default_particles(),
            wait_time: default_wait_time(),
            range_variance: default_range_variance(),
            bearing_variance: default_bearing_variance(),
            seed: 0,
        }
    }
}

/// Loop-closure search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopClosureSection {
    #[serde(default = "default_false")]
    pub enabled: bool,
    /// Spatial search radius in meters around the current pose.
    #[serde(default = "default_search_radius")]
    pub search_radius: f32,
    /// Minimum index gap between the current keyframe and a candidate.
    #[serde(default = "default_min_index_gap")]
    pub min_index_gap: u64,
    /// Shared landmarks required to accept a closure.
    #[serde(default = "default_required_reobserved")]
    pub required_reobserved: usize,
}

fn default_search_radius() -> f32 {
    2.0
}
fn default_min_index_gap() -> u64 {
    10
}
fn default_required_reobserved() -> usize {
    2
}

impl Default for LoopClosureSection {
    fn default() -> Self {
        Self {
            enabled: false,
            search_radius: default_search_radius(),
            min_index_gap: default_min_index_gap(),
            required_reobserved: default_required_reobserved(),
        }
    }
}

/// Post-optimization outlier rejection (batch mode only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierSection {
    #[serde(default = "default_false")]
    pub enabled: bool,
    /// Lateral jump in meters that rejects a solve.
    #[serde(default = "default_jump_threshold")]
    pub jump_threshold: f32,
    /// Pose index at which the gate becomes active.
    #[serde(default = "default_outlier_start")]
    pub start_index: u64,
}

fn default_jump_threshold() -> f32 {
    0.5
}
fn default_outlier_start() -> u64 {
    10
}

impl Default for OutlierSection {
    fn default() -> Self {
        Self {
            enabled: false,
            jump_threshold: default_jump_threshold(),
            start_index: default_outlier_start(),
        }
    }
}

/// Trajectory smoothing (active only when keyframe mode is off).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothingSection {
    #[serde(default = "default_false")]
    pub enabled: bool,
    /// Moving-average window over trailing trajectory poses.
    #[serde(default = "default_smoothing_window")]
    pub window: usize,
    /// Pose index at which smoothing starts.
    #[serde(default = "default_smoothing_start")]
    pub start_index: u64,
}

fn default_smoothing_window() -> usize {
    5
}
fn default_smoothing_start() -> u64 {
    10
}

impl Default for SmoothingSection {
    fn default() -> Self {
        Self {
            enabled: false,
            window: default_smoothing_window(),
            start_index: default_smoothing_start(),
        }
    }
}

/// Prior landmark table and tag-id bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkSection {
    /// CSV to load the prior tag table from, if any.
    #[serde(default)]
    pub load_csv: Option<String>,
    /// CSV to save mapped tag locations to, if any.
    #[serde(default)]
    pub save_csv: Option<String>,
    /// Whether `save_landmarks` writes anything.
    #[serde(default = "default_false")]
    pub save_tag_locations: bool,
    /// Restrict observations to tags present in the prior table.
    #[serde(default = "default_false")]
    pub use_prior_table: bool,
    /// Total number of tag ids deployed; higher ids are dropped.
    #[serde(default = "default_total_tags")]
    pub total_tags: u32,
}

fn default_total_tags() -> u32 {
    64
}

impl Default for LandmarkSection {
    fn default() -> Self {
        Self {
            load_csv: None,
            save_csv: None,
            save_tag_locations: false,
            use_prior_table: false,
            total_tags: default_total_tags(),
        }
    }
}

/// One camera stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraEntry {
    /// Short name used to key detection arrays.
    pub name: String,
    /// Detection topic the host subscribes to.
    pub topic: String,
    /// TF frame id of the camera.
    pub frame: String,
}

/// Trajectory CSV outputs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistenceSection {
    /// Raw odometry log path, if any.
    #[serde(default)]
    pub raw_odom_csv: Option<String>,
    /// Refined odometry log path, if any.
    #[serde(default)]
    pub refined_odom_csv: Option<String>,
}
