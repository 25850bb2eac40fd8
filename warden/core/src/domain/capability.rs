// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Value Objects
//!
//! A [`Capability`] is a coarse-grained, named permission declared by exactly one
//! plugin manifest. Roles are granted a capability with a [`CapabilityValue`];
//! when a user holds several roles that grant the same capability, the value with
//! the highest precedence wins (see [`crate::domain::precedence`]).
//!
//! ## Precedence
//!
//! ```text
//! allow(6) > consent(5) > compliance(4) > scoped(3) > anonymized(2) > deny(1)
//! ```
//!
//! The order is the declaration order of [`CapabilityValue`], so `Ord` on the enum
//! *is* the precedence relation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::role::RoleKey;

/// Unique capability identifier, e.g. `"boards.export"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityKey(String);

impl CapabilityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of the plugin that declared a capability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value a role is granted for a capability.
///
/// Variants are declared lowest precedence first so the derived `Ord` matches the
/// conflict-resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityValue {
    Deny,
    Anonymized,
    Scoped,
    Compliance,
    Consent,
    Allow,
}

impl CapabilityValue {
    pub const ALL: [CapabilityValue; 6] = [
        CapabilityValue::Deny,
        CapabilityValue::Anonymized,
        CapabilityValue::Scoped,
        CapabilityValue::Compliance,
        CapabilityValue::Consent,
        CapabilityValue::Allow,
    ];

    /// Numeric rank, 1 (`deny`) through 6 (`allow`).
    pub fn precedence(self) -> u8 {
        match self {
            Self::Deny => 1,
            Self::Anonymized => 2,
            Self::Scoped => 3,
            Self::Compliance => 4,
            Self::Consent => 5,
            Self::Allow => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::Anonymized => "anonymized",
            Self::Scoped => "scoped",
            Self::Compliance => "compliance",
            Self::Consent => "consent",
            Self::Allow => "allow",
        }
    }
}

impl Default for CapabilityValue {
    /// A bare role key in a manifest implies `allow`.
    fn default() -> Self {
        Self::Allow
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Unknown capability value '{0}'. \
     Expected one of: allow, consent, compliance, scoped, anonymized, deny"
)]
pub struct UnknownCapabilityValue(pub String);

impl FromStr for CapabilityValue {
    type Err = UnknownCapabilityValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == normalized)
            .ok_or_else(|| UnknownCapabilityValue(s.to_string()))
    }
}

/// A single role → value grant attached to a capability declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: RoleKey,
    pub value: CapabilityValue,
}

impl RoleGrant {
    pub fn new(role: impl Into<RoleKey>, value: CapabilityValue) -> Self {
        Self {
            role: role.into(),
            value,
        }
    }

    /// Canonical `"role:value"` form used by the policy signature.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.role, self.value)
    }
}

/// A fully normalized capability declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub key: CapabilityKey,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// Plugin that declared this capability.
    pub source: PluginId,
    pub namespace: String,
    #[serde(default)]
    pub assignments: Vec<RoleGrant>,
}

impl Capability {
    pub fn new(
        key: impl Into<CapabilityKey>,
        source: PluginId,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            scope: None,
            category: None,
            tags: Vec::new(),
            metadata: None,
            source,
            namespace: namespace.into(),
            assignments: Vec::new(),
        }
    }

    pub fn with_grant(mut self, role: impl Into<RoleKey>, value: CapabilityValue) -> Self {
        self.set_grant(role.into(), value);
        self
    }

    /// Insert or overwrite the grant for `role`. A role appears at most once.
    pub fn set_grant(&mut self, role: RoleKey, value: CapabilityValue) {
        match self.assignments.iter_mut().find(|g| g.role == role) {
            Some(existing) => existing.value = value,
            None => self.assignments.push(RoleGrant { role, value }),
        }
    }

    pub fn grant_for(&self, role: &RoleKey) -> Option<CapabilityValue> {
        self.assignments
            .iter()
            .find(|g| &g.role == role)
            .map(|g| g.value)
    }

    /// Bring the declaration into its stable form: grants ordered by role, tags
    /// trimmed, de-duplicated and sorted, blank optional strings dropped.
    pub fn normalize(&mut self) {
        self.assignments.sort_by(|a, b| a.role.cmp(&b.role));
        self.assignments.dedup_by(|a, b| a.role == b.role);

        self.tags = self
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self.tags.sort();
        self.tags.dedup();

        self.description = self.description.trim().to_string();
        for field in [&mut self.scope, &mut self.category] {
            if field.as_deref().map(str::trim).is_some_and(str::is_empty) {
                *field = None;
            }
        }
    }
}
