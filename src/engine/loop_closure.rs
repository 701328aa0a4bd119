//! Loop-closure detection through landmark co-visibility.
//!
//! A closure is proposed when the robot passes near an old keyframe that
//! shares enough observed landmarks with the current one. At most one
//! closure is added per keyframe; candidates are scanned oldest first.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::LoopClosureSection;
use crate::core::types::Pose2D;
use crate::graph::{Key, Values};

/// A proposed loop-closure constraint.
#[derive(Debug, Clone)]
pub struct LoopClosureProposal {
    /// Historical keyframe key.
    pub from: Key,
    /// Current keyframe key.
    pub to: Key,
    /// Relative measurement `between(P_from, P_to)` at current estimates.
    pub delta: Pose2D,
}

/// Co-visibility loop-closure detector.
#[derive(Debug, Clone)]
pub struct LoopClosureDetector {
    config: LoopClosureSection,
}

impl LoopClosureDetector {
    /// Create with the given configuration.
    pub fn new(config: LoopClosureSection) -> Self {
        Self { config }
    }

    /// Whether detection is enabled.
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Find at most one closure for the current keyframe.
    ///
    /// * `current_index` - index of the just-added keyframe
    /// * `current_pose` - its current estimate
    /// * `last_pose` - the engine's current predicted pose (spatial gate)
    /// * `current_landmarks` - landmarks observed at the current keyframe
    /// * `pose_to_landmarks` - landmark sets of historical keyframes
    /// * `estimates` - estimate source for historical keyframe poses
    pub fn detect(
        &self,
        current_index: u64,
        current_pose: &Pose2D,
        last_pose: &Pose2D,
        current_landmarks: &BTreeSet<Key>,
        pose_to_landmarks: &BTreeMap<Key, BTreeSet<Key>>,
        estimates: &Values,
    ) -> Option<LoopClosureProposal> {
        if !self.config.enabled {
            return None;
        }

        for (keyframe, landmarks) in pose_to_landmarks {
            let Some(keyframe_index) = keyframe.pose_index() else {
                continue;
            };
            if current_index.saturating_sub(keyframe_index) <= self.config.min_index_gap {
                continue;
            }
            let Some(keyframe_pose) = estimates.pose(keyframe) else {
                continue;
            };
            if last_pose.range(&keyframe_pose) >= self.config.search_radius {
                continue;
            }

            let reobserved = current_landmarks.intersection(landmarks).count();
            if reobserved >= self.config.required_reobserved {
                log::info!(
                    "loop closure: {} -> X{} ({} shared landmarks)",
                    keyframe,
                    current_index,
                    reobserved
                );
                return Some(LoopClosureProposal {
                    from: *keyframe,
                    to: Key::Pose(current_index),
                    delta: keyframe_pose.between(current_pose),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Value;
    use approx::assert_relative_eq;

    fn config() -> LoopClosureSection {
        LoopClosureSection {
            enabled: true,
            search_radius: 2.0,
            min_index_gap: 5,
            required_reobserved: 1,
        }
    }

    fn landmark_set(ids: &[u32]) -> BTreeSet<Key> {
        ids.iter().map(|id| Key::Landmark(*id)).collect()
    }

    fn setup() -> (BTreeMap<Key, BTreeSet<Key>>, Values) {
        let mut history = BTreeMap::new();
        let mut estimates = Values::new();
        // X2 near the origin saw tag 0; X8 far away saw tag 1.
        history.insert(Key::Pose(2), landmark_set(&[0]));
        estimates.insert(Key::Pose(2), Value::Pose(Pose2D::new(0.5, 0.0, 0.0)));
        history.insert(Key::Pose(8), landmark_set(&[1]));
        estimates.insert(Key::Pose(8), Value::Pose(Pose2D::new(10.0, 0.0, 0.0)));
        (history, estimates)
    }

    #[test]
    fn test_detects_closure_with_shared_landmark() {
        let (history, mut estimates) = setup();
        let current = Pose2D::new(0.2, 0.1, 0.0);
        estimates.insert(Key::Pose(20), Value::Pose(current));

        let detector = LoopClosureDetector::new(config());
        let proposal = detector
            .detect(
                20,
                &current,
                &current,
                &landmark_set(&[0]),
                &history,
                &estimates,
            )
            .expect("closure expected");

        assert_eq!(proposal.from, Key::Pose(2));
        assert_eq!(proposal.to, Key::Pose(20));
        assert_relative_eq!(proposal.delta.x, -0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_index_gap_blocks_recent_keyframes() {
        let (history, estimates) = setup();
        let current = Pose2D::new(0.2, 0.1, 0.0);
        let detector = LoopClosureDetector::new(config());
        // Index 6: gap to X2 is 4, below min_index_gap.
        assert!(detector
            .detect(6, &current, &current, &landmark_set(&[0]), &history, &estimates)
            .is_none());
    }

    #[test]
    fn test_radius_blocks_distant_keyframes() {
        let (history, estimates) = setup();
        // Near X8 spatially but sharing tag 0 only with the distant X2.
        let current = Pose2D::new(10.0, 0.5, 0.0);
        let detector = LoopClosureDetector::new(config());
        assert!(detector
            .detect(20, &current, &current, &landmark_set(&[0]), &history, &estimates)
            .is_none());
    }

    #[test]
    fn test_required_reobserved_count() {
        let (mut history, mut estimates) = setup();
        history.insert(Key::Pose(3), landmark_set(&[2, 3]));
        estimates.insert(Key::Pose(3), Value::Pose(Pose2D::new(0.0, 0.5, 0.0)));

        let mut strict = config();
        strict.required_reobserved = 2;
        let detector = LoopClosureDetector::new(strict);
        let current = Pose2D::new(0.1, 0.2, 0.0);

        // Only one shared landmark: rejected.
        assert!(detector
            .detect(20, &current, &current, &landmark_set(&[2]), &history, &estimates)
            .is_none());
        // Two shared landmarks: accepted.
        assert!(detector
            .detect(20, &current, &current, &landmark_set(&[2, 3]), &history, &estimates)
            .is_some());
    }

    #[test]
    fn test_disabled_detector_is_inert() {
        let (history, estimates) = setup();
        let mut off = config();
        off.enabled = false;
        let detector = LoopClosureDetector::new(off);
        let current = Pose2D::new(0.2, 0.1, 0.0);
        assert!(detector
            .detect(20, &current, &current, &landmark_set(&[0]), &history, &estimates)
            .is_none());
    }

    #[test]
    fn test_earliest_candidate_wins() {
        let (mut history, mut estimates) = setup();
        // A later keyframe also saw tag 0 nearby.
        history.insert(Key::Pose(4), landmark_set(&[0]));
        estimates.insert(Key::Pose(4), Value::Pose(Pose2D::new(0.6, 0.1, 0.0)));

        let detector = LoopClosureDetector::new(config());
        let current = Pose2D::new(0.2, 0.1, 0.0);
        let proposal = detector
            .detect(20, &current, &current, &landmark_set(&[0]), &history, &estimates)
            .unwrap();
        assert_eq!(proposal.from, Key::Pose(2));
    }
}
