//! Graph size bounding by pose-count eviction.
//!
//! When the graph holds more pose variables than allowed, the oldest excess
//! poses are evicted together with every incident factor, and the oldest
//! surviving pose is re-anchored with a prior so the trimmed graph stays
//! well-posed.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{DiagonalNoise, Factor, FactorStore, Key, Values};

/// Prune the graph down to `max_poses` pose variables.
///
/// Returns the evicted pose keys (empty when no pruning was needed).
pub fn prune_by_pose_count(
    graph: &mut FactorStore,
    estimates: &mut Values,
    pose_to_landmarks: &mut BTreeMap<Key, BTreeSet<Key>>,
    prior_added: &mut BTreeSet<Key>,
    max_poses: usize,
    prior_noise: &DiagonalNoise,
) -> BTreeSet<Key> {
    let pose_keys = graph.referenced_pose_keys();
    if pose_keys.len() <= max_poses {
        return BTreeSet::new();
    }

    let excess = pose_keys.len() - max_poses;
    let evicted: BTreeSet<Key> = pose_keys.iter().take(excess).copied().collect();

    let removed = graph.remove_incident(&evicted);
    for key in &evicted {
        estimates.remove(key);
        pose_to_landmarks.remove(key);
        prior_added.remove(key);
    }
    log::debug!(
        "pruned {} poses and {} factors",
        evicted.len(),
        removed
    );

    // Anchor the oldest survivor unless it already carries a prior.
    if let Some(oldest) = pose_keys.iter().find(|key| !evicted.contains(key)) {
        if !prior_added.contains(oldest) {
            if let Some(pose) = estimates.pose(oldest) {
                graph.add(Factor::PriorPose {
                    key: *oldest,
                    prior: pose,
                    noise: prior_noise.clone(),
                });
                prior_added.insert(*oldest);
            }
        }
    }

    evicted
}
