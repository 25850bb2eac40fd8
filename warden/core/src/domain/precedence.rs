// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Precedence Merge
//!
//! Folds the grants of every role a user holds into one [`EffectiveCapabilityMap`].
//! For each capability the grant with the highest [`CapabilityValue`] wins. The
//! fold is `max` per key, which is associative and commutative, so the order in
//! which roles are visited never changes the result.
//!
//! A capability no role grants is absent from the map. `deny` only appears when a
//! role set it explicitly and no role granted anything higher.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

use crate::domain::capability::{CapabilityKey, CapabilityValue};

/// Precedence-resolved `capability → value` mapping for one user at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectiveCapabilityMap(BTreeMap<CapabilityKey, CapabilityValue>);

impl EffectiveCapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a grant, keeping whichever value has the higher precedence.
    pub fn grant(&mut self, key: CapabilityKey, value: CapabilityValue) {
        self.0
            .entry(key)
            .and_modify(|current| {
                if value > *current {
                    *current = value;
                }
            })
            .or_insert(value);
    }

    /// Merge another map into this one with the same precedence rule.
    pub fn merge(&mut self, other: &EffectiveCapabilityMap) {
        for (key, value) in other.iter() {
            self.grant(key.clone(), *value);
        }
    }

    pub fn get(&self, key: &CapabilityKey) -> Option<CapabilityValue> {
        self.0.get(key).copied()
    }

    /// `true` when the capability is present with any value other than `deny`.
    pub fn permits(&self, key: &CapabilityKey) -> bool {
        matches!(self.get(key), Some(v) if v != CapabilityValue::Deny)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, CapabilityKey, CapabilityValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(CapabilityKey, CapabilityValue)> for EffectiveCapabilityMap {
    fn from_iter<T: IntoIterator<Item = (CapabilityKey, CapabilityValue)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.grant(key, value);
        }
        map
    }
}

impl<'a> IntoIterator for &'a EffectiveCapabilityMap {
    type Item = (&'a CapabilityKey, &'a CapabilityValue);
    type IntoIter = btree_map::Iter<'a, CapabilityKey, CapabilityValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Merge per-role grant lists into one effective map.
pub fn merge_grants<I, G>(per_role: I) -> EffectiveCapabilityMap
where
    I: IntoIterator<Item = G>,
    G: IntoIterator<Item = (CapabilityKey, CapabilityValue)>,
{
    per_role.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grants(pairs: &[(&str, CapabilityValue)]) -> Vec<(CapabilityKey, CapabilityValue)> {
        pairs.iter().map(|(k, v)| (CapabilityKey::new(*k), *v)).collect()
    }

    #[test]
    fn test_highest_precedence_wins() {
        let r1 = grants(&[("boards.export", CapabilityValue::Scoped)]);
        let r2 = grants(&[("boards.export", CapabilityValue::Allow)]);

        let forward = merge_grants([r1.clone(), r2.clone()]);
        let backward = merge_grants([r2, r1]);

        assert_eq!(forward.get(&"boards.export".into()), Some(CapabilityValue::Allow));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_deny_only_when_nothing_higher() {
        let baseline = grants(&[
            ("blog.comment", CapabilityValue::Deny),
            ("boards.view", CapabilityValue::Deny),
        ]);
        let member = grants(&[("boards.view", CapabilityValue::Anonymized)]);

        let map = merge_grants([baseline, member]);
        assert_eq!(map.get(&"blog.comment".into()), Some(CapabilityValue::Deny));
        assert_eq!(map.get(&"boards.view".into()), Some(CapabilityValue::Anonymized));
        assert!(!map.permits(&"blog.comment".into()));
        assert!(map.permits(&"boards.view".into()));
    }

    #[test]
    fn test_ungranted_capability_is_absent() {
        let map = merge_grants([grants(&[("boards.view", CapabilityValue::Allow)])]);
        assert_eq!(map.get(&"boards.delete".into()), None);
        assert!(!map.permits(&"boards.delete".into()));
        assert!(merge_grants(Vec::<Vec<(CapabilityKey, CapabilityValue)>>::new()).is_empty());
    }

    #[test]
    fn test_merge_is_commutative_over_all_value_pairs() {
        for a in CapabilityValue::ALL {
            for b in CapabilityValue::ALL {
                let left = merge_grants([grants(&[("x", a)]), grants(&[("x", b)])]);
                let right = merge_grants([grants(&[("x", b)]), grants(&[("x", a)])]);
                assert_eq!(left, right);
                assert_eq!(left.get(&"x".into()), Some(a.max(b)));
            }
        }
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let map = merge_grants([grants(&[
            ("boards.export", CapabilityValue::Scoped),
            ("blog.publish", CapabilityValue::Allow),
        ])]);
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json, serde_json::json!({"blog.publish": "allow", "boards.export": "scoped"}));
    }
}
