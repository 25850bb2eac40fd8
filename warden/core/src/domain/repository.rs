// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts consumed by the authorization core. The storage engine
//! itself is an external collaborator; these traits are the whole surface the
//! core relies on.
//!
//! | Trait | Backs |
//! |-------|-------|
//! | `CapabilityRepository` | capabilities, role → capability grants |
//! | `RoleRepository` | external role catalog (read-only) |
//! | `RoleAssignmentRepository` | user → role assignments (read-only) |
//! | `SessionRepository` | session records |
//! | `SettingsRepository` | generic key/value settings |
//!
//! Each has an `InMemory*` and a `Postgres*` implementation in
//! [`crate::infrastructure::repositories`].
//!
//! ## Upserts
//!
//! `upsert_capability` and `upsert_assignment` are single atomic primitives. A
//! backend without native upsert must express them as "insert; on unique
//! conflict, update" inside one transaction, never as a read followed by a write.

use async_trait::async_trait;

use crate::domain::capability::{Capability, CapabilityKey, CapabilityValue};
use crate::domain::role::{Role, RoleId, RoleKey, UserId};
use crate::domain::session::{Session, SessionId, SessionSnapshot};

/// Settings key under which the seeder publishes the live policy signature.
pub const CAPABILITIES_SIGNATURE_SETTING: &str = "capabilities_signature";

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// One stored role → capability grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StoredAssignment {
    pub role_id: RoleId,
    pub capability: CapabilityKey,
    pub value: CapabilityValue,
}

#[async_trait]
pub trait CapabilityRepository: Send + Sync {
    /// Insert or overwrite a capability, keyed by `key`. The declared
    /// `assignments` are stored for inspection only; effective grants go
    /// through `upsert_assignment`.
    async fn upsert_capability(&self, capability: &Capability) -> Result<(), RepositoryError>;

    /// Insert or overwrite the value of one `(role, capability)` grant.
    async fn upsert_assignment(
        &self,
        role_id: RoleId,
        capability: &CapabilityKey,
        value: CapabilityValue,
    ) -> Result<(), RepositoryError>;

    /// Delete every grant of `capability` held by a role outside `keep`.
    /// Returns the number of grants removed.
    async fn retain_assignments(
        &self,
        capability: &CapabilityKey,
        keep: &[RoleId],
    ) -> Result<u64, RepositoryError>;

    async fn find_by_key(&self, key: &CapabilityKey) -> Result<Option<Capability>, RepositoryError>;

    /// All stored capabilities ordered by key, each with the grants it declared
    /// at its last seeding. Use `list_assignments` for the effective grants.
    async fn list_all(&self) -> Result<Vec<Capability>, RepositoryError>;

    /// Every grant held by one role.
    async fn find_grants_for_role(
        &self,
        role_id: RoleId,
    ) -> Result<Vec<(CapabilityKey, CapabilityValue)>, RepositoryError>;

    /// Every stored grant, ordered.
    async fn list_assignments(&self) -> Result<Vec<StoredAssignment>, RepositoryError>;
}

/// Read-only access to the externally owned role catalog.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_by_key(&self, key: &RoleKey) -> Result<Option<Role>, RepositoryError>;

    /// All roles in catalog order.
    async fn list_all(&self) -> Result<Vec<Role>, RepositoryError>;
}

/// Read-only access to user → role assignments.
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    async fn find_role_keys_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RoleKey>, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Save session (create or update)
    async fn save(&self, session: &Session) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, RepositoryError>;

    /// Replace only the authorization snapshot of an existing session, leaving
    /// every lifecycle field untouched. `NotFound` if the session is gone.
    async fn store_snapshot(
        &self,
        id: SessionId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError>;
}

/// Generic key/value settings store.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RepositoryError::Unavailable(err.to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
