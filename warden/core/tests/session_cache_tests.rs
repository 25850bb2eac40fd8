// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session capability cache behavior end to end: seeding publishes a signature,
//! sessions pick it up lazily, and storage failures fail open.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use warden_core::application::collector::CapabilityCollector;
use warden_core::application::resolver::{
    CapabilityResolver, PrecedenceResolver, ResolveError, ResolvedAuthorization,
};
use warden_core::application::seeder::{PolicySeeder, SeedOptions};
use warden_core::application::session_cache::{CacheOutcome, SessionCapabilityCache};
use warden_core::domain::capability::{CapabilityKey, CapabilityValue};
use warden_core::domain::events::PolicyEvent;
use warden_core::domain::precedence::EffectiveCapabilityMap;
use warden_core::domain::repository::{
    CapabilityRepository, RepositoryError, RoleAssignmentRepository, SessionRepository,
};
use warden_core::domain::role::{Role, RoleCatalog, RoleKey, UserId};
use warden_core::domain::session::Session;
use warden_core::infrastructure::event_bus::EventBus;
use warden_core::infrastructure::policy_state_file::JsonFilePolicyStateStore;
use warden_core::infrastructure::repositories::{
    InMemoryCapabilityRepository, InMemoryRoleAssignmentRepository, InMemoryRoleRepository,
    InMemorySessionRepository, InMemorySettingsRepository,
};

// ============================================================================
// Test doubles
// ============================================================================

/// Counts how often a user had to be re-resolved.
struct CountingResolver {
    inner: PrecedenceResolver,
    calls: AtomicUsize,
}

#[async_trait]
impl CapabilityResolver for CountingResolver {
    async fn resolve(&self, roles: &[Role]) -> Result<EffectiveCapabilityMap, ResolveError> {
        self.inner.resolve(roles).await
    }

    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedAuthorization, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_user(user_id).await
    }
}

/// Role assignment store that can be switched to fail.
struct FlakyAssignments {
    inner: InMemoryRoleAssignmentRepository,
    failing: AtomicBool,
}

#[async_trait]
impl RoleAssignmentRepository for FlakyAssignments {
    async fn find_role_keys_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RoleKey>, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("connection refused".to_string()));
        }
        self.inner.find_role_keys_for_user(user_id).await
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct World {
    plugins: tempfile::TempDir,
    _state: tempfile::TempDir,
    catalog: RoleCatalog,
    capabilities: Arc<InMemoryCapabilityRepository>,
    sessions: Arc<InMemorySessionRepository>,
    assignments: Arc<FlakyAssignments>,
    resolver: Arc<CountingResolver>,
    event_bus: Arc<EventBus>,
    seeder: PolicySeeder,
    cache: SessionCapabilityCache,
}

impl World {
    fn new() -> Self {
        let plugins = tempfile::tempdir().unwrap();
        let state = tempfile::tempdir().unwrap();
        let catalog = RoleCatalog::from_keys(["editor", "viewer"]);

        let capabilities = Arc::new(InMemoryCapabilityRepository::new());
        let roles = Arc::new(InMemoryRoleRepository::with_roles(&catalog));
        let settings = Arc::new(InMemorySettingsRepository::new());
        let sessions = Arc::new(InMemorySessionRepository::new());
        let assignments = Arc::new(FlakyAssignments {
            inner: InMemoryRoleAssignmentRepository::new(),
            failing: AtomicBool::new(false),
        });
        let event_bus = Arc::new(EventBus::new(64));

        let resolver = Arc::new(CountingResolver {
            inner: PrecedenceResolver::new(
                capabilities.clone(),
                roles.clone(),
                assignments.clone(),
            ),
            calls: AtomicUsize::new(0),
        });
        let seeder = PolicySeeder::new(
            capabilities.clone(),
            roles,
            settings.clone(),
            Arc::new(JsonFilePolicyStateStore::new(state.path().join("policy-state.json"))),
            event_bus.clone(),
        );
        let cache = SessionCapabilityCache::new(
            sessions.clone(),
            settings,
            resolver.clone(),
            event_bus.clone(),
        );

        Self {
            plugins,
            _state: state,
            catalog,
            capabilities,
            sessions,
            assignments,
            resolver,
            event_bus,
            seeder,
            cache,
        }
    }

    fn install(&self, dir: &str, json: &str) {
        let plugin = self.plugins.path().join(dir);
        std::fs::create_dir_all(&plugin).unwrap();
        std::fs::write(plugin.join("plugin.json"), json).unwrap();
    }

    async fn seed(&self) {
        let policy = CapabilityCollector::new(2)
            .collect(self.plugins.path(), &self.catalog)
            .unwrap();
        self.seeder.seed(&policy, SeedOptions::default()).await.unwrap();
    }

    async fn login(&self, roles: &[&str]) -> Session {
        let user = UserId::new();
        for role in roles {
            self.assignments.inner.assign(user, *role);
        }
        let session = Session::new(user, Duration::hours(8));
        self.sessions.save(&session).await.unwrap();
        self.cache.establish(session.id).await.unwrap();
        session
    }

    fn resolutions(&self) -> usize {
        self.resolver.calls.load(Ordering::SeqCst)
    }
}

const BOARDS: &str = r#"{"id": "boards", "capabilities": [
    {"key": "boards.export", "roles": ["editor", {"role": "viewer", "value": "scoped"}]}
]}"#;

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_boards_export_end_to_end() {
    let world = World::new();
    world.install("boards", BOARDS);
    world.seed().await;

    let assignments = world.capabilities.list_assignments().await.unwrap();
    assert_eq!(assignments.len(), 2);

    let export = CapabilityKey::new("boards.export");

    let viewer = world.login(&["viewer"]).await;
    let cached = world.cache.snapshot(viewer.id).await.unwrap();
    assert_eq!(cached.outcome, CacheOutcome::Fresh);
    assert_eq!(cached.snapshot.capabilities().len(), 1);
    assert_eq!(cached.snapshot.capabilities().get(&export), Some(CapabilityValue::Scoped));

    let both = world.login(&["editor", "viewer"]).await;
    let cached = world.cache.snapshot(both.id).await.unwrap();
    assert_eq!(cached.snapshot.capabilities().get(&export), Some(CapabilityValue::Allow));
    assert!(cached.snapshot.has_role(&RoleKey::new("editor")));
    assert!(cached.snapshot.has_role(&RoleKey::new("viewer")));
}

#[tokio::test]
async fn test_lazy_refresh_after_signature_change() {
    let world = World::new();
    world.install("boards", BOARDS);
    world.seed().await;

    let session = world.login(&["viewer"]).await;
    let after_login = world.resolutions();

    // Unchanged policy: no recomputation
    assert_eq!(world.cache.snapshot(session.id).await.unwrap().outcome, CacheOutcome::Fresh);
    assert_eq!(world.resolutions(), after_login);

    // Policy changes: viewer is promoted to allow
    world.install(
        "boards",
        r#"{"id": "boards", "capabilities": [
            {"key": "boards.export", "roles": ["editor", "viewer"]}
        ]}"#,
    );
    world.seed().await;

    let refreshed = world.cache.snapshot(session.id).await.unwrap();
    assert_eq!(refreshed.outcome, CacheOutcome::Refreshed);
    assert_eq!(world.resolutions(), after_login + 1);
    assert_eq!(
        refreshed.snapshot.capabilities().get(&CapabilityKey::new("boards.export")),
        Some(CapabilityValue::Allow)
    );

    let again = world.cache.snapshot(session.id).await.unwrap();
    assert_eq!(again.outcome, CacheOutcome::Fresh);
    assert_eq!(world.resolutions(), after_login + 1);
}

#[tokio::test]
async fn test_fail_open_keeps_previous_snapshot() {
    let world = World::new();
    world.install("boards", BOARDS);
    world.seed().await;

    let session = world.login(&["viewer"]).await;
    let before = world.cache.snapshot(session.id).await.unwrap().snapshot;

    let mut events = world.event_bus.subscribe_session(session.id);

    world.install(
        "boards",
        r#"{"id": "boards", "capabilities": [
            {"key": "boards.export", "roles": ["editor"]},
            {"key": "boards.view", "roles": ["viewer"]}
        ]}"#,
    );
    world.seed().await;
    world.assignments.failing.store(true, Ordering::SeqCst);

    let cached = world.cache.snapshot(session.id).await.unwrap();
    assert_eq!(cached.outcome, CacheOutcome::FailedOpen);
    assert_eq!(cached.snapshot, before);

    // Stored snapshot untouched, so the next request retries
    let stored = world.sessions.find_by_id(session.id).await.unwrap().unwrap();
    assert_eq!(stored.snapshot, before);

    match events.recv().await.unwrap() {
        PolicyEvent::SessionRefreshFailed { reason, .. } => {
            assert!(reason.contains("connection refused"))
        }
        other => panic!("expected SessionRefreshFailed, got {:?}", other),
    }

    world.assignments.failing.store(false, Ordering::SeqCst);
    let recovered = world.cache.snapshot(session.id).await.unwrap();
    assert_eq!(recovered.outcome, CacheOutcome::Refreshed);
    assert!(recovered.snapshot.capabilities().permits(&CapabilityKey::new("boards.view")));
    assert_eq!(
        recovered.snapshot.capabilities().get(&CapabilityKey::new("boards.export")),
        None
    );
}

#[tokio::test]
async fn test_revoked_grant_disappears_on_refresh() {
    let world = World::new();
    world.install("boards", BOARDS);
    world.seed().await;

    let export = CapabilityKey::new("boards.export");
    let viewer = world.login(&["viewer"]).await;
    let editor = world.login(&["editor"]).await;
    assert_eq!(
        world.cache.snapshot(viewer.id).await.unwrap().snapshot.capabilities().get(&export),
        Some(CapabilityValue::Scoped)
    );

    world.install(
        "boards",
        r#"{"id": "boards", "capabilities": [
            {"key": "boards.export", "roles": ["editor"]}
        ]}"#,
    );
    world.seed().await;

    let cached = world.cache.snapshot(viewer.id).await.unwrap();
    assert_eq!(cached.outcome, CacheOutcome::Refreshed);
    assert_eq!(cached.snapshot.capabilities().get(&export), None);

    let cached = world.cache.snapshot(editor.id).await.unwrap();
    assert_eq!(cached.outcome, CacheOutcome::Refreshed);
    assert_eq!(cached.snapshot.capabilities().get(&export), Some(CapabilityValue::Allow));

    assert_eq!(world.capabilities.list_assignments().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_login_failure_stores_stale_empty_snapshot() {
    let world = World::new();
    world.install("boards", BOARDS);
    world.seed().await;

    world.assignments.failing.store(true, Ordering::SeqCst);
    let session = world.login(&["viewer"]).await;

    let stored = world.sessions.find_by_id(session.id).await.unwrap().unwrap();
    assert!(stored.snapshot.capabilities().is_empty());
    assert!(stored.snapshot.capabilities_signature().is_none());

    world.assignments.failing.store(false, Ordering::SeqCst);
    let cached = world.cache.snapshot(session.id).await.unwrap();
    assert_eq!(cached.outcome, CacheOutcome::Refreshed);
    assert_eq!(
        cached.snapshot.capabilities().get(&CapabilityKey::new("boards.export")),
        Some(CapabilityValue::Scoped)
    );
}
