//! Tag detections, camera extrinsics, and the per-camera aggregator.
//!
//! Cameras report tag detections in their own frame; the aggregator merges
//! the latest array per camera into one frame of (id, robot-frame position)
//! observations. Camera extrinsics are planar (x, y, yaw) poses resolved at
//! startup from a host-provided static-transform port.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::CameraEntry;
use crate::core::types::{Point2D, Pose2D};
use crate::error::{Result, SlamError};

/// One decoded tag detection in the reporting camera's frame.
#[derive(Debug, Clone, Copy)]
pub struct TagDetection {
    /// Tag id.
    pub id: u32,
    /// Planar tag position in the camera frame.
    pub position: Point2D,
}

/// A rigid transform as delivered by the host's transform tree.
#[derive(Debug, Clone, Copy)]
pub struct Transform3D {
    /// Translation (x, y, z) in meters.
    pub translation: [f32; 3],
    /// Rotation quaternion (x, y, z, w).
    pub rotation: [f32; 4],
}

/// Host port for static transform lookup.
pub trait TransformLookup {
    /// Transform from `source_frame` into `target_frame`, if available.
    fn lookup_transform(&self, target_frame: &str, source_frame: &str) -> Option<Transform3D>;
}

/// Map-backed lookup keyed by source frame, for hosts with a fixed set of
/// transforms and for tests.
#[derive(Debug, Default)]
pub struct StaticTransforms {
    map: BTreeMap<String, Transform3D>,
}

impl StaticTransforms {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the transform of `source_frame` relative to the robot.
    pub fn insert(&mut self, source_frame: &str, transform: Transform3D) {
        self.map.insert(source_frame.to_string(), transform);
    }
}

impl TransformLookup for StaticTransforms {
    fn lookup_transform(&self, _target_frame: &str, source_frame: &str) -> Option<Transform3D> {
        self.map.get(source_frame).copied()
    }
}

/// Extract the planar (x, y, yaw) extrinsic from a camera transform.
///
/// Yaw is the direction of the camera's optical (z) axis projected onto the
/// ground plane. Returns `None` when the optical axis is vertical.
pub fn planar_extrinsic(transform: &Transform3D) -> Option<Pose2D> {
    let [qx, qy, qz, qw] = transform.rotation;
    // Third column of the rotation matrix: the camera z axis in robot frame.
    let zx = 2.0 * (qx * qz + qw * qy);
    let zy = 2.0 * (qy * qz - qw * qx);
    if (zx * zx + zy * zy).sqrt() < 1e-6 {
        return None;
    }
    let yaw = zy.atan2(zx);
    Some(Pose2D::new(
        transform.translation[0],
        transform.translation[1],
        yaw,
    ))
}

/// A camera with its resolved planar extrinsic.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    /// Short name keying detection arrays.
    pub name: String,
    /// Detection topic (host side).
    pub topic: String,
    /// TF frame id.
    pub frame: String,
    /// Planar robot-to-camera extrinsic.
    pub extrinsic: Pose2D,
}

/// Resolve the planar extrinsic of every configured camera, retrying the
/// transform lookup a bounded number of times.
///
/// This is the one permitted blocking wait in the back end; it runs at
/// startup only. Exhausting the retries is fatal.
pub fn resolve_extrinsics(
    cameras: &[CameraEntry],
    robot_frame: &str,
    lookup: &dyn TransformLookup,
    max_attempts: u32,
    retry_interval: Duration,
) -> Result<Vec<CameraInfo>> {
    let mut resolved = Vec::with_capacity(cameras.len());
    for camera in cameras {
        let mut transform = None;
        for attempt in 0..max_attempts {
            match lookup.lookup_transform(robot_frame, &camera.frame) {
                Some(tf) => {
                    transform = Some(tf);
                    break;
                }
                None => {
                    log::warn!(
                        "waiting for static TF from {} to {} (attempt {})",
                        robot_frame,
                        camera.frame,
                        attempt + 1
                    );
                    if attempt + 1 < max_attempts {
                        std::thread::sleep(retry_interval);
                    }
                }
            }
        }
        let transform = transform.ok_or_else(|| SlamError::MissingTransform {
            robot_frame: robot_frame.to_string(),
            camera_frame: camera.frame.clone(),
            attempts: max_attempts,
        })?;
        let extrinsic = planar_extrinsic(&transform)
            .ok_or_else(|| SlamError::DegenerateExtrinsic(camera.name.clone()))?;
        log::info!(
            "TF loaded for {} ({}): ({:.2}, {:.2}, {:.2} rad)",
            camera.name,
            camera.frame,
            extrinsic.x,
            extrinsic.y,
            extrinsic.theta
        );
        resolved.push(CameraInfo {
            name: camera.name.clone(),
            topic: camera.topic.clone(),
            frame: camera.frame.clone(),
            extrinsic,
        });
    }
    Ok(resolved)
}

/// Merges the latest detection array per camera into robot-frame frames.
#[derive(Debug)]
pub struct DetectionAggregator {
    extrinsics: BTreeMap<String, Pose2D>,
    latest: BTreeMap<String, Vec<TagDetection>>,
    total_tags: u32,
}

impl DetectionAggregator {
    /// Create from resolved camera infos.
    pub fn new(cameras: &[CameraInfo], total_tags: u32) -> Self {
        Self {
            extrinsics: cameras
                .iter()
                .map(|c| (c.name.clone(), c.extrinsic))
                .collect(),
            latest: BTreeMap::new(),
            total_tags,
        }
    }

    /// Record the latest array for a camera. An empty array clears the
    /// camera's pending detections; unknown camera names are dropped.
    pub fn ingest(&mut self, camera: &str, detections: Vec<TagDetection>) {
        if !self.extrinsics.contains_key(camera) {
            log::warn!("detections from unknown camera '{}' dropped", camera);
            return;
        }
        if detections.is_empty() {
            self.latest.remove(camera);
        } else {
            self.latest.insert(camera.to_string(), detections);
        }
    }

    /// Consume all pending arrays, returning (tag id, robot-frame position)
    /// pairs. Cameras that have not published since the previous call
    /// contribute nothing; tag ids at or above `total_tags` are dropped.
    pub fn take_frame(&mut self) -> Vec<(u32, Point2D)> {
        let mut frame = Vec::new();
        let pending = std::mem::take(&mut self.latest);
        for (camera, detections) in pending {
            let extrinsic = self.extrinsics[&camera];
            for detection in detections {
                if detection.id >= self.total_tags {
                    log::warn!(
                        "tag id {} from '{}' exceeds total_tags {}",
                        detection.id,
                        camera,
                        self.total_tags
                    );
                    continue;
                }
                frame.push((detection.id, extrinsic.transform_point(&detection.position)));
            }
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    /// Quaternion for a rotation about +y by 90°: camera z maps onto robot x.
    fn forward_camera_rotation() -> [f32; 4] {
        let half = std::f32::consts::FRAC_PI_4;
        [0.0, half.sin(), 0.0, half.cos()]
    }

    fn camera_info(name: &str, extrinsic: Pose2D) -> CameraInfo {
        CameraInfo {
            name: name.to_string(),
            topic: format!("/{}/tag_detections", name),
            frame: format!("cam_{}", name),
            extrinsic,
        }
    }

    #[test]
    fn test_planar_extrinsic_forward_camera() {
        let transform = Transform3D {
            translation: [0.1, 0.0, 0.3],
            rotation: forward_camera_rotation(),
        };
        let extrinsic = planar_extrinsic(&transform).unwrap();
        assert_relative_eq!(extrinsic.x, 0.1);
        assert_relative_eq!(extrinsic.theta, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_planar_extrinsic_vertical_axis_rejected() {
        // Identity rotation: optical axis points straight up.
        let transform = Transform3D {
            translation: [0.0, 0.0, 0.3],
            rotation: [0.0, 0.0, 0.0, 1.0],
        };
        assert!(planar_extrinsic(&transform).is_none());
    }

    #[test]
    fn test_resolve_extrinsics_retries_then_fails() {
        let cameras = vec![CameraEntry {
            name: "front".into(),
            topic: "/front/tag_detections".into(),
            frame: "cam_front".into(),
        }];
        let lookup = StaticTransforms::new();
        let result = resolve_extrinsics(
            &cameras,
            "base_link",
            &lookup,
            2,
            Duration::from_millis(1),
        );
        assert!(matches!(result, Err(SlamError::MissingTransform { .. })));
    }

    #[test]
    fn test_resolve_extrinsics_success() {
        let cameras = vec![CameraEntry {
            name: "front".into(),
            topic: "/front/tag_detections".into(),
            frame: "cam_front".into(),
        }];
        let mut lookup = StaticTransforms::new();
        lookup.insert(
            "cam_front",
            Transform3D {
                translation: [0.2, 0.0, 0.1],
                rotation: forward_camera_rotation(),
            },
        );
        let resolved =
            resolve_extrinsics(&cameras, "base_link", &lookup, 1, Duration::from_millis(1))
                .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_relative_eq!(resolved[0].extrinsic.x, 0.2);
    }

    #[test]
    fn test_aggregator_latest_wins_and_consumes() {
        let cameras = vec![camera_info("front", Pose2D::identity())];
        let mut aggregator = DetectionAggregator::new(&cameras, 16);

        aggregator.ingest(
            "front",
            vec![TagDetection {
                id: 0,
                position: Point2D::new(1.0, 0.0),
            }],
        );
        aggregator.ingest(
            "front",
            vec![TagDetection {
                id: 0,
                position: Point2D::new(2.0, 0.0),
            }],
        );

        let frame = aggregator.take_frame();
        assert_eq!(frame.len(), 1);
        assert_relative_eq!(frame[0].1.x, 2.0);

        // Nothing published since: next frame is empty.
        assert!(aggregator.take_frame().is_empty());
    }

    #[test]
    fn test_aggregator_applies_extrinsic() {
        // Camera at (0.5, 0) rotated 90°: camera x maps to robot y.
        let cameras = vec![camera_info("left", Pose2D::new(0.5, 0.0, FRAC_PI_2))];
        let mut aggregator = DetectionAggregator::new(&cameras, 16);

        aggregator.ingest(
            "left",
            vec![TagDetection {
                id: 1,
                position: Point2D::new(2.0, 0.0),
            }],
        );
        let frame = aggregator.take_frame();
        assert_relative_eq!(frame[0].1.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(frame[0].1.y, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_aggregator_filters_out_of_range_ids() {
        let cameras = vec![camera_info("front", Pose2D::identity())];
        let mut aggregator = DetectionAggregator::new(&cameras, 4);
        aggregator.ingest(
            "front",
            vec![
                TagDetection {
                    id: 3,
                    position: Point2D::new(1.0, 0.0),
                },
                TagDetection {
                    id: 4,
                    position: Point2D::new(1.0, 0.0),
                },
            ],
        );
        let frame = aggregator.take_frame();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].0, 3);
    }

    #[test]
    fn test_aggregator_empty_array_clears() {
        let cameras = vec![camera_info("front", Pose2D::identity())];
        let mut aggregator = DetectionAggregator::new(&cameras, 16);
        aggregator.ingest(
            "front",
            vec![TagDetection {
                id: 0,
                position: Point2D::new(1.0, 0.0),
            }],
        );
        aggregator.ingest("front", Vec::new());
        assert!(aggregator.take_frame().is_empty());
    }

    #[test]
    fn test_aggregator_unknown_camera_ignored() {
        let cameras = vec![camera_info("front", Pose2D::identity())];
        let mut aggregator = DetectionAggregator::new(&cameras, 16);
        aggregator.ingest(
            "ghost",
            vec![TagDetection {
                id: 0,
                position: Point2D::new(1.0, 0.0),
            }],
        );
        assert!(aggregator.take_frame().is_empty());
    }
}
