// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy State and Drift
//!
//! [`PolicyState`] is the last-seen summary of the full collected policy set,
//! written after every seeding run and used only to report drift on the next one.
//!
//! ```json
//! {
//!   "signature": "sha256:…",
//!   "generatedAt": "2026-03-01T12:00:00Z",
//!   "capabilities": [{"key": "boards.export", "source": "boards"}]
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::capability::{Capability, CapabilityKey, PluginId};
use crate::domain::signature::PolicySignature;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyStateEntry {
    pub key: CapabilityKey,
    pub source: PluginId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyState {
    pub signature: PolicySignature,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub capabilities: Vec<PolicyStateEntry>,
}

impl PolicyState {
    pub fn from_capabilities(signature: PolicySignature, capabilities: &[Capability]) -> Self {
        let mut entries: Vec<PolicyStateEntry> = capabilities
            .iter()
            .map(|c| PolicyStateEntry {
                key: c.key.clone(),
                source: c.source.clone(),
            })
            .collect();
        entries.sort();
        Self {
            signature,
            generated_at: Utc::now(),
            capabilities: entries,
        }
    }

    fn keys(&self) -> BTreeSet<&CapabilityKey> {
        self.capabilities.iter().map(|e| &e.key).collect()
    }
}

/// Capabilities that appeared or disappeared between two seeding runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDrift {
    pub added: Vec<CapabilityKey>,
    pub removed: Vec<CapabilityKey>,
}

impl PolicyDrift {
    /// Diff by capability key. With no previous state every current key is `added`.
    pub fn between(previous: Option<&PolicyState>, current: &PolicyState) -> Self {
        let now = current.keys();
        let before = previous.map(PolicyState::keys).unwrap_or_default();

        Self {
            added: now.difference(&before).map(|k| (*k).clone()).collect(),
            removed: before.difference(&now).map(|k| (*k).clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyStateError {
    #[error("Failed to access policy state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Policy state file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable home of the last-seen [`PolicyState`].
#[async_trait]
pub trait PolicyStateStore: Send + Sync {
    /// Previously written state, or `None` on the first run.
    async fn load(&self) -> Result<Option<PolicyState>, PolicyStateError>;

    /// Replace the stored state. Must be atomic: a crash mid-write leaves the
    /// previous state intact.
    async fn save(&self, state: &PolicyState) -> Result<(), PolicyStateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(keys: &[&str]) -> PolicyState {
        let caps: Vec<Capability> = keys
            .iter()
            .map(|k| Capability::new(*k, PluginId::new("p"), "p"))
            .collect();
        PolicyState::from_capabilities(PolicySignature::compute(&caps), &caps)
    }

    #[test]
    fn test_drift_reports_added_and_removed() {
        let drift = PolicyDrift::between(Some(&state(&["A", "B"])), &state(&["B", "C"]));
        assert_eq!(drift.removed, vec![CapabilityKey::new("A")]);
        assert_eq!(drift.added, vec![CapabilityKey::new("C")]);
    }

    #[test]
    fn test_identical_state_has_no_drift() {
        let drift = PolicyDrift::between(Some(&state(&["A", "B"])), &state(&["B", "A"]));
        assert!(drift.is_empty());
    }

    #[test]
    fn test_first_run_reports_everything_added() {
        let drift = PolicyDrift::between(None, &state(&["A", "B"]));
        assert_eq!(drift.added.len(), 2);
        assert!(drift.removed.is_empty());
    }

    #[test]
    fn test_state_file_format() {
        let json = serde_json::to_value(state(&["boards.export"])).unwrap();
        assert!(json["signature"].as_str().unwrap().starts_with("sha256:"));
        assert!(json.get("generatedAt").is_some());
        assert_eq!(json["capabilities"][0]["key"], "boards.export");
        assert_eq!(json["capabilities"][0]["source"], "p");
    }
}
