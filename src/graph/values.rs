//! Estimate store: variable key → current estimate.

use std::collections::BTreeMap;

use crate::core::types::{Point2D, Pose2D};

use super::Key;

/// A variable estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// SE(2) pose estimate.
    Pose(Pose2D),
    /// 2D point estimate.
    Point(Point2D),
}

/// Ordered key → estimate map.
///
/// Backed by a `BTreeMap` so iteration (and hence the solver's variable
/// ordering) is deterministic for a given set of keys.
#[derive(Debug, Clone, Default)]
pub struct Values {
    map: BTreeMap<Key, Value>,
}

impl Values {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an estimate.
    pub fn insert(&mut self, key: Key, value: Value) {
        self.map.insert(key, value);
    }

    /// Replace an existing estimate (same as insert, named for call sites
    /// that semantically update rather than create).
    pub fn update(&mut self, key: Key, value: Value) {
        self.map.insert(key, value);
    }

    /// Whether an estimate exists for `key`.
    pub fn contains(&self, key: &Key) -> bool {
        self.map.contains_key(key)
    }

    /// Pose estimate for `key`, if present and a pose.
    pub fn pose(&self, key: &Key) -> Option<Pose2D> {
        match self.map.get(key) {
            Some(Value::Pose(p)) => Some(*p),
            _ => None,
        }
    }

    /// Point estimate for `key`, if present and a point.
    pub fn point(&self, key: &Key) -> Option<Point2D> {
        match self.map.get(key) {
            Some(Value::Point(p)) => Some(*p),
            _ => None,
        }
    }

    /// Remove an estimate.
    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        self.map.remove(key)
    }

    /// Iterate over (key, value) in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.map.iter()
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.map.keys()
    }

    /// Number of estimates.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Indices of all pose variables, ascending.
    pub fn pose_indices(&self) -> Vec<u64> {
        self.map
            .keys()
            .filter_map(|k| k.pose_index())
            .collect()
    }

    /// All landmark estimates as (tag id, point), ascending by id.
    pub fn landmarks(&self) -> Vec<(u32, Point2D)> {
        self.map
            .iter()
            .filter_map(|(k, v)| match (k, v) {
                (Key::Landmark(id), Value::Point(p)) => Some((*id, *p)),
                _ => None,
            })
            .collect()
    }
}
