// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Roles and Role Catalog
//!
//! Roles are owned by an external catalog. This core never creates roles; it
//! only references them by [`RoleKey`] and fails loudly when a key is unknown
//! at resolution time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable, human-readable role identifier (e.g. `"editor"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleKey(String);

impl RoleKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoleKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RoleKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Storage-internal role identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub Uuid);

impl RoleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id derived from the role key, used by the in-memory catalog
    /// so that ids survive process restarts.
    pub fn from_key(key: &RoleKey) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_str().as_bytes()))
    }
}

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog entry as published by the owner of the role catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub key: RoleKey,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl RoleDefinition {
    pub fn new(key: impl Into<RoleKey>, label: impl Into<String>, level: i32) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            level,
            scope: None,
        }
    }
}

/// A persisted role: a catalog definition plus its storage id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub key: RoleKey,
    pub label: String,
    pub level: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Role {
    pub fn definition(&self) -> RoleDefinition {
        RoleDefinition {
            key: self.key.clone(),
            label: self.label.clone(),
            level: self.level,
            scope: self.scope.clone(),
        }
    }
}

impl From<RoleDefinition> for Role {
    fn from(def: RoleDefinition) -> Self {
        Self {
            id: RoleId::from_key(&def.key),
            key: def.key,
            label: def.label,
            level: def.level,
            scope: def.scope,
        }
    }
}

/// Ordered, read-only view of the external role catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCatalog {
    roles: Vec<RoleDefinition>,
}

impl RoleCatalog {
    pub fn new(roles: Vec<RoleDefinition>) -> Self {
        Self { roles }
    }

    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<RoleKey>,
    {
        Self::new(
            keys.into_iter()
                .map(|k| {
                    let key = k.into();
                    let label = key.as_str().to_string();
                    RoleDefinition::new(key, label, 0)
                })
                .collect(),
        )
    }

    pub fn get(&self, key: &RoleKey) -> Option<&RoleDefinition> {
        self.roles.iter().find(|r| &r.key == key)
    }

    pub fn contains(&self, key: &RoleKey) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.iter()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// A single user → role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub role_key: RoleKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_id_from_key_is_stable() {
        let a = RoleId::from_key(&RoleKey::new("editor"));
        let b = RoleId::from_key(&RoleKey::new("editor"));
        let c = RoleId::from_key(&RoleKey::new("viewer"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_catalog_lookup_preserves_order() {
        let catalog = RoleCatalog::from_keys(["viewer", "editor", "admin"]);
        assert!(catalog.contains(&RoleKey::new("editor")));
        assert!(!catalog.contains(&RoleKey::new("owner")));

        let keys: Vec<_> = catalog.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["viewer", "editor", "admin"]);
    }
}
