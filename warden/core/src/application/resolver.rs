// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Precedence Resolver
//!
//! Turns a set of held roles into an [`EffectiveCapabilityMap`]. Each role's
//! grants are fetched concurrently and merged with [`merge_grants`]; when two
//! roles grant the same capability the value with the higher precedence wins.
//!
//! The resolver keeps no state between calls and is safe to share across
//! request handlers.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use crate::domain::precedence::{merge_grants, EffectiveCapabilityMap};
use crate::domain::repository::{
    CapabilityRepository, RepositoryError, RoleAssignmentRepository, RoleRepository,
};
use crate::domain::role::{Role, RoleKey, UserId};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Role '{0}' does not exist in the role catalog")]
    UnknownRole(RoleKey),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Roles a user holds together with the capabilities they add up to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthorization {
    pub roles: Vec<Role>,
    pub capabilities: EffectiveCapabilityMap,
}

#[async_trait]
pub trait CapabilityResolver: Send + Sync {
    /// Effective capabilities of the given roles.
    async fn resolve(&self, roles: &[Role]) -> Result<EffectiveCapabilityMap, ResolveError>;

    /// Roles and effective capabilities of a user.
    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedAuthorization, ResolveError>;
}

pub struct PrecedenceResolver {
    capability_repository: Arc<dyn CapabilityRepository>,
    role_repository: Arc<dyn RoleRepository>,
    assignment_repository: Arc<dyn RoleAssignmentRepository>,
    /// Role every user holds implicitly.
    baseline_role: Option<RoleKey>,
}

impl PrecedenceResolver {
    pub fn new(
        capability_repository: Arc<dyn CapabilityRepository>,
        role_repository: Arc<dyn RoleRepository>,
        assignment_repository: Arc<dyn RoleAssignmentRepository>,
    ) -> Self {
        Self {
            capability_repository,
            role_repository,
            assignment_repository,
            baseline_role: None,
        }
    }

    pub fn with_baseline_role(mut self, role: Option<RoleKey>) -> Self {
        self.baseline_role = role;
        self
    }

    async fn role_keys(&self, user_id: UserId) -> Result<Vec<RoleKey>, ResolveError> {
        let mut keys = self.assignment_repository.find_role_keys_for_user(user_id).await?;
        if let Some(baseline) = &self.baseline_role {
            keys.push(baseline.clone());
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl CapabilityResolver for PrecedenceResolver {
    async fn resolve(&self, roles: &[Role]) -> Result<EffectiveCapabilityMap, ResolveError> {
        let per_role = try_join_all(
            roles
                .iter()
                .map(|role| self.capability_repository.find_grants_for_role(role.id)),
        )
        .await?;

        Ok(merge_grants(per_role))
    }

    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedAuthorization, ResolveError> {
        let keys = self.role_keys(user_id).await?;

        let found =
            try_join_all(keys.iter().map(|key| self.role_repository.find_by_key(key))).await?;
        let roles = keys
            .into_iter()
            .zip(found)
            .map(|(key, role)| role.ok_or(ResolveError::UnknownRole(key)))
            .collect::<Result<Vec<_>, _>>()?;

        let capabilities = self.resolve(&roles).await?;
        debug!(
            "Resolved {} capabilities from {} role(s) for user {}",
            capabilities.len(),
            roles.len(),
            user_id
        );

        Ok(ResolvedAuthorization { roles, capabilities })
    }
}
