// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Session Authorization Snapshot
//!
//! Each authenticated session carries a [`SessionSnapshot`]: the user's roles, the
//! precedence-resolved capability map and the policy signature the map was
//! resolved against.
//!
//! ## Invariants
//!
//! - `capabilities_signature` is only ever set by [`SessionSnapshot::resolved`],
//!   together with the map and roles it describes. There is no setter.
//! - A snapshot without a signature is permanently stale and will be refreshed
//!   on the next read (unless the live signature is unset).
//! - The snapshot is written as one value, so no reader can observe a map
//!   resolved against a signature older than the one stored next to it.
//!
//! The surrounding [`Session`] lifecycle (creation, expiry, deletion) is owned by
//! the session layer, not by this core.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::precedence::EffectiveCapabilityMap;
use crate::domain::role::{Role, RoleId, RoleKey, UserId};
use crate::domain::signature::PolicySignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role as embedded in a session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRole {
    pub id: RoleId,
    pub key: RoleKey,
    pub label: String,
    pub level: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<&Role> for SessionRole {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            key: role.key.clone(),
            label: role.label.clone(),
            level: role.level,
            scope: role.scope.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    roles: Vec<SessionRole>,
    #[serde(default)]
    capabilities: EffectiveCapabilityMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capabilities_signature: Option<PolicySignature>,
}

impl SessionSnapshot {
    /// Snapshot produced by a successful resolution against `signature`.
    ///
    /// `signature` is `None` when the live signature is unset (seeder never ran).
    pub fn resolved(
        roles: Vec<SessionRole>,
        capabilities: EffectiveCapabilityMap,
        signature: Option<PolicySignature>,
    ) -> Self {
        Self {
            roles,
            capabilities,
            capabilities_signature: signature,
        }
    }

    /// Empty snapshot with no signature; stale by construction.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn roles(&self) -> &[SessionRole] {
        &self.roles
    }

    pub fn capabilities(&self) -> &EffectiveCapabilityMap {
        &self.capabilities
    }

    pub fn capabilities_signature(&self) -> Option<&PolicySignature> {
        self.capabilities_signature.as_ref()
    }

    /// `true` when the snapshot was resolved against exactly `live`.
    pub fn is_fresh(&self, live: &PolicySignature) -> bool {
        self.capabilities_signature.as_ref() == Some(live)
    }

    pub fn has_role(&self, key: &RoleKey) -> bool {
        self.roles.iter().any(|r| &r.key == key)
    }
}

/// Session record. Only `snapshot` is written by this core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub snapshot: SessionSnapshot,
}

impl Session {
    /// New session for `user_id` valid for `ttl`, with an empty (stale) snapshot.
    pub fn new(user_id: UserId, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
            snapshot: SessionSnapshot::empty(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::{CapabilityKey, CapabilityValue};

    #[test]
    fn test_empty_snapshot_is_never_fresh() {
        let snapshot = SessionSnapshot::empty();
        let live = PolicySignature::compute(&[]);
        assert!(!snapshot.is_fresh(&live));
        assert!(snapshot.capabilities_signature().is_none());
    }

    #[test]
    fn test_snapshot_wire_format() {
        let role = Role {
            id: RoleId::from_key(&RoleKey::new("viewer")),
            key: RoleKey::new("viewer"),
            label: "Viewer".into(),
            level: 10,
            scope: None,
        };
        let caps: EffectiveCapabilityMap =
            [(CapabilityKey::new("boards.export"), CapabilityValue::Scoped)].into_iter().collect();
        let sig = PolicySignature::compute(&[]);
        let snapshot =
            SessionSnapshot::resolved(vec![SessionRole::from(&role)], caps, Some(sig.clone()));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["capabilitiesSignature"], sig.as_str());
        assert_eq!(json["capabilities"]["boards.export"], "scoped");
        assert_eq!(json["roles"][0]["key"], "viewer");

        let parsed: SessionSnapshot = serde_json::from_value(json).unwrap();
        assert!(parsed.is_fresh(&sig));
        assert!(parsed.has_role(&RoleKey::new("viewer")));
    }

    #[test]
    fn test_session_expiry() {
        let live = Session::new(UserId::new(), Duration::hours(1));
        assert!(!live.is_expired());

        let expired = Session::new(UserId::new(), Duration::seconds(-1));
        assert!(expired.is_expired());
    }
}
