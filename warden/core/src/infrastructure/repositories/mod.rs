// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the persistence contracts defined in
//! [`crate::domain::repository`].
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve capabilities, roles, sessions and settings
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresCapabilityRepository** - Capabilities and role/capability grants
//! - **PostgresRoleRepository** - Role catalog
//! - **PostgresRoleAssignmentRepository** - User → role membership
//! - **PostgresSessionRepository** - Sessions with their cached snapshot
//! - **PostgresSettingsRepository** - Key/value settings (live signature)
//!
//! ## In-Memory Repositories
//!
//! Lock-guarded maps used by tests and by `storage.backend: in_memory`.

pub mod postgres_capability;
pub mod postgres_role;
pub mod postgres_role_assignment;
pub mod postgres_session;
pub mod postgres_settings;

pub use postgres_capability::PostgresCapabilityRepository;
pub use postgres_role::PostgresRoleRepository;
pub use postgres_role_assignment::PostgresRoleAssignmentRepository;
pub use postgres_session::PostgresSessionRepository;
pub use postgres_settings::PostgresSettingsRepository;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::capability::{Capability, CapabilityKey, CapabilityValue};
use crate::domain::repository::{
    CapabilityRepository, RepositoryError, RoleAssignmentRepository, RoleRepository,
    SessionRepository, SettingsRepository, StoredAssignment,
};
use crate::domain::role::{Role, RoleCatalog, RoleId, RoleKey, UserId};
use crate::domain::session::{Session, SessionId, SessionSnapshot};

// ============================================================================
// Capabilities
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryCapabilityRepository {
    capabilities: Arc<RwLock<BTreeMap<CapabilityKey, Capability>>>,
    assignments: Arc<RwLock<BTreeMap<(RoleId, CapabilityKey), CapabilityValue>>>,
}

impl InMemoryCapabilityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CapabilityRepository for InMemoryCapabilityRepository {
    async fn upsert_capability(&self, capability: &Capability) -> Result<(), RepositoryError> {
        self.capabilities
            .write()
            .insert(capability.key.clone(), capability.clone());
        Ok(())
    }

    async fn upsert_assignment(
        &self,
        role_id: RoleId,
        capability: &CapabilityKey,
        value: CapabilityValue,
    ) -> Result<(), RepositoryError> {
        self.assignments
            .write()
            .insert((role_id, capability.clone()), value);
        Ok(())
    }

    async fn retain_assignments(
        &self,
        capability: &CapabilityKey,
        keep: &[RoleId],
    ) -> Result<u64, RepositoryError> {
        let mut assignments = self.assignments.write();
        let before = assignments.len();
        assignments.retain(|(role_id, key), _| key != capability || keep.contains(role_id));
        Ok((before - assignments.len()) as u64)
    }

    async fn find_by_key(
        &self,
        key: &CapabilityKey,
    ) -> Result<Option<Capability>, RepositoryError> {
        Ok(self.capabilities.read().get(key).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Capability>, RepositoryError> {
        Ok(self.capabilities.read().values().cloned().collect())
    }

    async fn find_grants_for_role(
        &self,
        role_id: RoleId,
    ) -> Result<Vec<(CapabilityKey, CapabilityValue)>, RepositoryError> {
        Ok(self
            .assignments
            .read()
            .iter()
            .filter(|((id, _), _)| *id == role_id)
            .map(|((_, key), value)| (key.clone(), *value))
            .collect())
    }

    async fn list_assignments(&self) -> Result<Vec<StoredAssignment>, RepositoryError> {
        Ok(self
            .assignments
            .read()
            .iter()
            .map(|((role_id, capability), value)| StoredAssignment {
                role_id: *role_id,
                capability: capability.clone(),
                value: *value,
            })
            .collect())
    }
}

// ============================================================================
// Roles
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryRoleRepository {
    roles: Arc<RwLock<BTreeMap<RoleKey, Role>>>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated from the configured role catalog.
    pub fn with_roles(catalog: &RoleCatalog) -> Self {
        let repo = Self::new();
        for definition in catalog.iter() {
            repo.insert(Role::from(definition.clone()));
        }
        repo
    }

    pub fn insert(&self, role: Role) {
        self.roles.write().insert(role.key.clone(), role);
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn find_by_key(&self, key: &RoleKey) -> Result<Option<Role>, RepositoryError> {
        Ok(self.roles.read().get(key).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Role>, RepositoryError> {
        Ok(self.roles.read().values().cloned().collect())
    }
}

// ============================================================================
// Role Assignments
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryRoleAssignmentRepository {
    assignments: Arc<RwLock<HashMap<UserId, Vec<RoleKey>>>>,
}

impl InMemoryRoleAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` to `user_id`. Assigning the same role twice is a no-op.
    pub fn assign(&self, user_id: UserId, role: impl Into<RoleKey>) {
        let role = role.into();
        let mut assignments = self.assignments.write();
        let roles = assignments.entry(user_id).or_default();
        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    pub fn revoke(&self, user_id: UserId, role: &RoleKey) {
        if let Some(roles) = self.assignments.write().get_mut(&user_id) {
            roles.retain(|r| r != role);
        }
    }
}

#[async_trait]
impl RoleAssignmentRepository for InMemoryRoleAssignmentRepository {
    async fn find_role_keys_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RoleKey>, RepositoryError> {
        Ok(self
            .assignments
            .read()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        self.sessions.write().insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.read().get(&id).cloned())
    }

    async fn store_snapshot(
        &self,
        id: SessionId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("session {}", id)))?;
        session.snapshot = snapshot.clone();
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<(), RepositoryError> {
        self.sessions.write().remove(&id);
        Ok(())
    }
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemorySettingsRepository {
    settings: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.settings.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        self.settings.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::PluginId;
    use crate::domain::role::RoleDefinition;
    use chrono::Duration;

    #[tokio::test]
    async fn test_capability_upsert_is_idempotent() {
        let repo = InMemoryCapabilityRepository::new();
        let cap = Capability::new("boards.export", PluginId::new("boards"), "boards");
        let role = RoleId::from_key(&RoleKey::new("editor"));

        for _ in 0..2 {
            repo.upsert_capability(&cap).await.unwrap();
            repo.upsert_assignment(role, &cap.key, CapabilityValue::Allow).await.unwrap();
        }

        assert_eq!(repo.list_all().await.unwrap().len(), 1);
        assert_eq!(repo.list_assignments().await.unwrap().len(), 1);

        repo.upsert_assignment(role, &cap.key, CapabilityValue::Scoped).await.unwrap();
        let grants = repo.find_grants_for_role(role).await.unwrap();
        assert_eq!(grants, vec![(cap.key.clone(), CapabilityValue::Scoped)]);
    }

    #[tokio::test]
    async fn test_list_all_returns_declared_grants() {
        let repo = InMemoryCapabilityRepository::new();
        let cap = Capability::new("boards.export", PluginId::new("boards"), "boards")
            .with_grant("editor", CapabilityValue::Allow);
        repo.upsert_capability(&cap).await.unwrap();

        let listed = repo.list_all().await.unwrap();
        assert_eq!(listed[0].assignments, cap.assignments);
        assert!(repo.list_assignments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retain_assignments_only_touches_one_capability() {
        let repo = InMemoryCapabilityRepository::new();
        let editor = RoleId::from_key(&RoleKey::new("editor"));
        let viewer = RoleId::from_key(&RoleKey::new("viewer"));
        let export = CapabilityKey::new("boards.export");
        let view = CapabilityKey::new("boards.view");

        for role in [editor, viewer] {
            repo.upsert_assignment(role, &export, CapabilityValue::Allow).await.unwrap();
            repo.upsert_assignment(role, &view, CapabilityValue::Allow).await.unwrap();
        }

        assert_eq!(repo.retain_assignments(&export, &[editor]).await.unwrap(), 1);
        assert_eq!(repo.retain_assignments(&export, &[editor]).await.unwrap(), 0);

        assert_eq!(
            repo.find_grants_for_role(viewer).await.unwrap(),
            vec![(view.clone(), CapabilityValue::Allow)]
        );
        assert_eq!(repo.find_grants_for_role(editor).await.unwrap().len(), 2);

        assert_eq!(repo.retain_assignments(&view, &[]).await.unwrap(), 2);
        assert_eq!(repo.list_assignments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_roles_from_catalog() {
        let catalog = RoleCatalog::new(vec![RoleDefinition::new("editor", "Editor", 20)]);
        let repo = InMemoryRoleRepository::with_roles(&catalog);

        let editor = repo.find_by_key(&RoleKey::new("editor")).await.unwrap().unwrap();
        assert_eq!(editor.id, RoleId::from_key(&RoleKey::new("editor")));
        assert_eq!(editor.level, 20);
        assert!(repo.find_by_key(&RoleKey::new("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assign_and_revoke() {
        let repo = InMemoryRoleAssignmentRepository::new();
        let user = UserId::new();
        repo.assign(user, "viewer");
        repo.assign(user, "viewer");
        repo.assign(user, "editor");
        assert_eq!(repo.find_role_keys_for_user(user).await.unwrap().len(), 2);

        repo.revoke(user, &RoleKey::new("viewer"));
        assert_eq!(repo.find_role_keys_for_user(user).await.unwrap(), vec![RoleKey::new("editor")]);
        assert!(repo.find_role_keys_for_user(UserId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_snapshot_requires_session() {
        let repo = InMemorySessionRepository::new();
        let result = repo.store_snapshot(SessionId::new(), &SessionSnapshot::empty()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));

        let session = Session::new(UserId::new(), Duration::hours(1));
        repo.save(&session).await.unwrap();
        repo.store_snapshot(session.id, &SessionSnapshot::empty()).await.unwrap();
        assert!(repo.find_by_id(session.id).await.unwrap().is_some());

        repo.delete(session.id).await.unwrap();
        assert!(repo.find_by_id(session.id).await.unwrap().is_none());
    }
}
