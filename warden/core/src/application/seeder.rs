// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy Seeder
//!
//! Writes a [`CollectedPolicy`] into durable storage and reports drift against
//! the previous run.
//!
//! # Flow
//!
//! 1. Upsert every capability (keyed by capability key)
//! 2. Resolve each grant's role key to a stored role and upsert the grant,
//!    then drop stored grants the capability no longer declares
//! 3. Diff against the previous policy state file and write the new one
//! 4. Publish the live signature setting (last, so sessions only ever see a
//!    signature whose grants are already committed)
//! 5. Publish `PolicySeeded` / `PolicyDrifted` on the event bus
//!
//! Storage failures abort the run and propagate to the caller. Capabilities
//! that disappeared entirely are only reported; their rows stay.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::collector::CollectedPolicy;
use crate::domain::capability::CapabilityKey;
use crate::domain::events::PolicyEvent;
use crate::domain::policy_state::{PolicyDrift, PolicyState, PolicyStateStore};
use crate::domain::repository::{
    CapabilityRepository, RoleRepository, SettingsRepository, StoredAssignment,
    CAPABILITIES_SIGNATURE_SETTING,
};
use crate::domain::role::{Role, RoleId, RoleKey};
use crate::domain::signature::PolicySignature;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy, Default)]
pub struct SeedOptions {
    /// Compute the drift report without writing anything.
    pub dry_run: bool,
}

/// A grant that was not written because its role does not exist in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAssignment {
    pub capability: CapabilityKey,
    pub role: RoleKey,
}

#[derive(Debug, Clone)]
pub struct SeedReport {
    pub signature: PolicySignature,
    pub previous_signature: Option<PolicySignature>,
    pub capabilities_upserted: usize,
    pub assignments_upserted: usize,
    /// Stored grants removed because a still-declared capability no longer
    /// grants that role. On a dry run, the grants that would be removed.
    pub assignments_revoked: usize,
    pub skipped_assignments: Vec<SkippedAssignment>,
    pub drift: PolicyDrift,
    pub dry_run: bool,
}

impl SeedReport {
    pub fn signature_changed(&self) -> bool {
        self.previous_signature.as_ref() != Some(&self.signature)
    }
}

pub struct PolicySeeder {
    capability_repository: Arc<dyn CapabilityRepository>,
    role_repository: Arc<dyn RoleRepository>,
    settings_repository: Arc<dyn SettingsRepository>,
    state_store: Arc<dyn PolicyStateStore>,
    event_bus: Arc<EventBus>,
}

impl PolicySeeder {
    pub fn new(
        capability_repository: Arc<dyn CapabilityRepository>,
        role_repository: Arc<dyn RoleRepository>,
        settings_repository: Arc<dyn SettingsRepository>,
        state_store: Arc<dyn PolicyStateStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            capability_repository,
            role_repository,
            settings_repository,
            state_store,
            event_bus,
        }
    }

    pub async fn seed(&self, policy: &CollectedPolicy, options: SeedOptions) -> Result<SeedReport> {
        info!(
            "Seeding {} capabilities (signature {}, dry_run={})",
            policy.capabilities.len(),
            policy.signature.short(),
            options.dry_run
        );

        let previous = self
            .state_store
            .load()
            .await
            .context("Failed to load previous policy state")?;
        let current =
            PolicyState::from_capabilities(policy.signature.clone(), &policy.capabilities);
        let drift = PolicyDrift::between(previous.as_ref(), &current);

        let mut roles: HashMap<RoleKey, Option<Role>> = HashMap::new();
        let mut skipped_assignments = Vec::new();
        let mut assignments_upserted = 0;
        let mut assignments_revoked = 0;

        // A dry run previews revocations against what is stored now
        let stored: Vec<StoredAssignment> = if options.dry_run {
            self.capability_repository
                .list_assignments()
                .await
                .context("Failed to list stored grants")?
        } else {
            Vec::new()
        };

        for capability in &policy.capabilities {
            let mut granted: Vec<RoleId> = Vec::with_capacity(capability.assignments.len());

            if !options.dry_run {
                self.capability_repository
                    .upsert_capability(capability)
                    .await
                    .with_context(|| format!("Failed to upsert capability {}", capability.key))?;
            }

            for grant in &capability.assignments {
                let role = match roles.get(&grant.role) {
                    Some(cached) => cached.clone(),
                    None => {
                        let found = self
                            .role_repository
                            .find_by_key(&grant.role)
                            .await
                            .with_context(|| format!("Failed to look up role {}", grant.role))?;
                        roles.insert(grant.role.clone(), found.clone());
                        found
                    }
                };

                let Some(role) = role else {
                    warn!(
                        "Skipping grant of {} to unknown role {}",
                        capability.key, grant.role
                    );
                    skipped_assignments.push(SkippedAssignment {
                        capability: capability.key.clone(),
                        role: grant.role.clone(),
                    });
                    continue;
                };

                if !options.dry_run {
                    self.capability_repository
                        .upsert_assignment(role.id, &capability.key, grant.value)
                        .await
                        .with_context(|| {
                            format!(
                                "Failed to upsert grant of {} to role {}",
                                capability.key, role.key
                            )
                        })?;
                }
                granted.push(role.id);
                assignments_upserted += 1;
            }

            let revoked = if options.dry_run {
                stored
                    .iter()
                    .filter(|a| a.capability == capability.key && !granted.contains(&a.role_id))
                    .count()
            } else {
                self.capability_repository
                    .retain_assignments(&capability.key, &granted)
                    .await
                    .with_context(|| {
                        format!("Failed to revoke stale grants of {}", capability.key)
                    })? as usize
            };
            if revoked > 0 {
                info!("Revoking {} stale grant(s) of {}", revoked, capability.key);
                assignments_revoked += revoked;
            }
        }

        for key in &drift.removed {
            warn!("Capability {} is no longer declared by any plugin", key);
        }
        if !drift.added.is_empty() {
            info!("{} capabilities added since the last seeding run", drift.added.len());
        }

        let report = SeedReport {
            signature: policy.signature.clone(),
            previous_signature: previous.map(|p| p.signature),
            capabilities_upserted: policy.capabilities.len(),
            assignments_upserted,
            assignments_revoked,
            skipped_assignments,
            drift,
            dry_run: options.dry_run,
        };

        if options.dry_run {
            info!("Dry run complete; nothing was written");
            return Ok(report);
        }

        self.state_store
            .save(&current)
            .await
            .context("Failed to write policy state")?;

        self.settings_repository
            .put(CAPABILITIES_SIGNATURE_SETTING, policy.signature.as_str())
            .await
            .context("Failed to publish capabilities signature")?;

        metrics::counter!("warden_policy_seed_total").increment(1);
        metrics::counter!("warden_policy_drift_removed_total")
            .increment(report.drift.removed.len() as u64);
        metrics::counter!("warden_policy_grants_revoked_total")
            .increment(report.assignments_revoked as u64);

        let now = Utc::now();
        self.event_bus.publish_policy_event(PolicyEvent::PolicySeeded {
            signature: report.signature.clone(),
            capability_count: report.capabilities_upserted,
            assignment_count: report.assignments_upserted,
            skipped_assignments: report.skipped_assignments.len(),
            seeded_at: now,
        });
        if !report.drift.is_empty() {
            self.event_bus.publish_policy_event(PolicyEvent::PolicyDrifted {
                signature: report.signature.clone(),
                added: report.drift.added.clone(),
                removed: report.drift.removed.clone(),
                detected_at: now,
            });
        }

        info!(
            "Policy seeded: {} capabilities, {} grants, {} revoked, {} skipped, signature {}",
            report.capabilities_upserted,
            report.assignments_upserted,
            report.assignments_revoked,
            report.skipped_assignments.len(),
            report.signature.short()
        );

        Ok(report)
    }
}
