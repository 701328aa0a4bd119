//! Movement and keyframe gates.

use std::collections::BTreeSet;

use crate::config::{KeyframeSection, StationarySection};
use crate::core::math::normalize_angle;
use crate::core::types::Pose2D;
use crate::graph::Key;

/// Whether motion since the last anchor exceeds the stationary thresholds.
pub fn movement_exceeds(last: &Pose2D, current: &Pose2D, config: &StationarySection) -> bool {
    let position_change = last.range(current);
    let rotation_change = normalize_angle(current.theta - last.theta).abs();
    position_change >= config.position_threshold || rotation_change >= config.rotation_threshold
}

/// Whether the predicted pose should be promoted to a keyframe.
///
/// True iff a landmark is observed now that was not observed at the previous
/// keyframe, or translation/rotation since the previous keyframe exceeds its
/// threshold. Pure over its inputs.
pub fn should_add_keyframe(
    last_keyframe: &Pose2D,
    predicted: &Pose2D,
    previous_landmarks: &BTreeSet<Key>,
    current_landmarks: &BTreeSet<Key>,
    config: &KeyframeSection,
) -> bool {
    for landmark in current_landmarks {
        if !previous_landmarks.contains(landmark) {
            return true;
        }
    }
    if last_keyframe.range(predicted) > config.distance_threshold {
        return true;
    }
    normalize_angle(predicted.theta - last_keyframe.theta).abs() > config.rotation_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stationary() -> StationarySection {
        StationarySection {
            position_threshold: 0.01,
            rotation_threshold: 0.005,
        }
    }

    fn keyframe() -> KeyframeSection {
        KeyframeSection {
            enabled: true,
            distance_threshold: 0.5,
            rotation_threshold: 0.5,
        }
    }

    #[test]
    fn test_movement_below_thresholds() {
        let last = Pose2D::identity();
        let current = Pose2D::new(0.005, 0.0, 0.001);
        assert!(!movement_exceeds(&last, &current, &stationary()));
    }

    #[test]
    fn test_movement_position_trigger() {
        let last = Pose2D::identity();
        assert!(movement_exceeds(
            &last,
            &Pose2D::new(0.02, 0.0, 0.0),
            &stationary()
        ));
    }

    #[test]
    fn test_movement_rotation_trigger() {
        let last = Pose2D::identity();
        assert!(movement_exceeds(
            &last,
            &Pose2D::new(0.0, 0.0, 0.01),
            &stationary()
        ));
    }

    #[test]
    fn test_keyframe_distance_trigger() {
        let empty = BTreeSet::new();
        assert!(should_add_keyframe(
            &Pose2D::identity(),
            &Pose2D::new(0.6, 0.0, 0.0),
            &empty,
            &empty,
            &keyframe()
        ));
        assert!(!should_add_keyframe(
            &Pose2D::identity(),
            &Pose2D::new(0.4, 0.0, 0.0),
            &empty,
            &empty,
            &keyframe()
        ));
    }

    #[test]
    fn test_keyframe_rotation_trigger() {
        let empty = BTreeSet::new();
        assert!(should_add_keyframe(
            &Pose2D::identity(),
            &Pose2D::new(0.0, 0.0, 0.6),
            &empty,
            &empty,
            &keyframe()
        ));
    }

    #[test]
    fn test_keyframe_new_tag_trigger() {
        let previous = BTreeSet::new();
        let mut current = BTreeSet::new();
        current.insert(Key::Landmark(7));
        assert!(should_add_keyframe(
            &Pose2D::identity(),
            &Pose2D::identity(),
            &previous,
            &current,
            &keyframe()
        ));
    }

    #[test]
    fn test_keyframe_same_tags_no_trigger() {
        let mut seen = BTreeSet::new();
        seen.insert(Key::Landmark(7));
        assert!(!should_add_keyframe(
            &Pose2D::identity(),
            &Pose2D::new(0.1, 0.0, 0.0),
            &seen,
            &seen,
            &keyframe()
        ));
    }

    #[test]
    fn test_keyframe_gate_idempotent() {
        let previous = BTreeSet::new();
        let mut current = BTreeSet::new();
        current.insert(Key::Landmark(1));
        let last = Pose2D::identity();
        let predicted = Pose2D::new(0.3, 0.0, 0.0);
        let config = keyframe();

        let first = should_add_keyframe(&last, &predicted, &previous, &current, &config);
        for _ in 0..5 {
            assert_eq!(
                should_add_keyframe(&last, &predicted, &previous, &current, &config),
                first
            );
        }
    }
}
