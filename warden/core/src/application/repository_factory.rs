// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend
//! configuration, keeping the domain layer free of infrastructure choices.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wire domain repository traits to in-memory or PostgreSQL adapters

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::domain::repository::{
    CapabilityRepository, RoleAssignmentRepository, RoleRepository, SessionRepository,
    SettingsRepository, StorageBackend,
};
use crate::domain::role::{Role, RoleCatalog};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryCapabilityRepository, InMemoryRoleAssignmentRepository, InMemoryRoleRepository,
    InMemorySessionRepository, InMemorySettingsRepository, PostgresCapabilityRepository,
    PostgresRoleAssignmentRepository, PostgresRoleRepository, PostgresSessionRepository,
    PostgresSettingsRepository,
};

/// Every repository the authorization core needs, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub capabilities: Arc<dyn CapabilityRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub assignments: Arc<dyn RoleAssignmentRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Repositories {
    pub fn in_memory(catalog: &RoleCatalog) -> Self {
        Self {
            capabilities: Arc::new(InMemoryCapabilityRepository::new()),
            roles: Arc::new(InMemoryRoleRepository::with_roles(catalog)),
            assignments: Arc::new(InMemoryRoleAssignmentRepository::new()),
            sessions: Arc::new(InMemorySessionRepository::new()),
            settings: Arc::new(InMemorySettingsRepository::new()),
        }
    }
}

/// Creates the repository set for the configured backend.
///
/// For PostgreSQL the configured role catalog (if any) is upserted into the
/// `roles` table so that seeding can resolve role keys.
pub async fn create_repositories(
    backend: &StorageBackend,
    catalog: &RoleCatalog,
) -> Result<Repositories> {
    match backend {
        StorageBackend::InMemory => Ok(Repositories::in_memory(catalog)),
        StorageBackend::PostgreSQL(config) => {
            let database = Database::new(&config.connection_string).await?;
            let pool = database.get_pool().clone();

            let roles = PostgresRoleRepository::new(pool.clone());
            for definition in catalog.iter() {
                roles
                    .upsert(&Role::from(definition.clone()))
                    .await
                    .with_context(|| format!("Failed to sync role {}", definition.key))?;
            }
            if !catalog.is_empty() {
                info!("Synced {} role(s) from configuration", catalog.len());
            }

            Ok(Repositories {
                capabilities: Arc::new(PostgresCapabilityRepository::new(pool.clone())),
                roles: Arc::new(roles),
                assignments: Arc::new(PostgresRoleAssignmentRepository::new(pool.clone())),
                sessions: Arc::new(PostgresSessionRepository::new(pool.clone())),
                settings: Arc::new(PostgresSettingsRepository::new(pool)),
            })
        }
    }
}
