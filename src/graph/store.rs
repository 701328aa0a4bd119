//! Append-mostly factor arena with key incidence indices.
//!
//! Factors live in an arena addressed by insertion id; a key → factor-id
//! index makes "drop everything incident to these variables" proportional to
//! the pruned keys' degree instead of the store size.

use std::collections::{BTreeSet, HashMap};

use super::factor::Factor;
use super::Key;

/// Arena id of a factor.
pub type FactorId = usize;

/// Ordered factor collection with incidence indices.
#[derive(Debug, Default)]
pub struct FactorStore {
    arena: Vec<Option<Factor>>,
    by_key: HashMap<Key, BTreeSet<FactorId>>,
    live: usize,
}

impl FactorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factor, returning its id.
    pub fn add(&mut self, factor: Factor) -> FactorId {
        let id = self.arena.len();
        for key in factor.keys() {
            self.by_key.entry(key).or_default().insert(id);
        }
        self.arena.push(Some(factor));
        self.live += 1;
        id
    }

    /// Number of live factors.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether there are no live factors.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate live factors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (FactorId, &Factor)> {
        self.arena
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|f| (id, f)))
    }

    /// Ids of live factors incident to `key`.
    pub fn ids_for_key(&self, key: &Key) -> Vec<FactorId> {
        self.by_key
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Pose keys referenced by at least one live factor.
    pub fn referenced_pose_keys(&self) -> BTreeSet<Key> {
        self.by_key
            .iter()
            .filter(|(key, ids)| key.is_pose() && !ids.is_empty())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Number of live prior factors anchored on `key`.
    pub fn prior_count_on(&self, key: &Key) -> usize {
        self.ids_for_key(key)
            .into_iter()
            .filter_map(|id| self.arena[id].as_ref())
            .filter(|f| f.is_prior_on(key))
            .count()
    }

    /// Drop every factor incident to any of `keys`. Returns how many were
    /// removed.
    pub fn remove_incident(&mut self, keys: &BTreeSet<Key>) -> usize {
        let mut doomed: BTreeSet<FactorId> = BTreeSet::new();
        for key in keys {
            if let Some(ids) = self.by_key.remove(key) {
                doomed.extend(ids);
            }
        }

        let mut removed = 0;
        for id in doomed {
            if let Some(factor) = self.arena[id].take() {
                removed += 1;
                self.live -= 1;
                for other in factor.keys() {
                    if let Some(ids) = self.by_key.get_mut(&other) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            self.by_key.remove(&other);
                        }
                    }
                }
            }
        }
        removed
    }

    /// Take every live factor out of the store in insertion order, leaving
    /// it empty. Used to hand staged factors to the incremental solver.
    pub fn drain(&mut self) -> Vec<Factor> {
        let factors = self.arena.drain(..).flatten().collect();
        self.by_key.clear();
        self.live = 0;
        factors
    }
}
