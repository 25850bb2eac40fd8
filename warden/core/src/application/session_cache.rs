// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session Capability Cache
//!
//! Every session carries a snapshot of the roles and effective capabilities it
//! was resolved with, stamped with the policy signature that was live at the
//! time. Requests read the snapshot and only re-resolve when the live
//! signature moved on.
//!
//! # Outcomes
//!
//! - [`CacheOutcome::Bypassed`]: no live signature is published; the stored
//!   snapshot is served as-is
//! - [`CacheOutcome::Fresh`]: stored signature equals the live one
//! - [`CacheOutcome::Refreshed`]: the snapshot was stale and was re-resolved
//! - [`CacheOutcome::FailedOpen`]: the snapshot was stale but could not be
//!   re-resolved; the previous snapshot is served and the failure is reported
//!   through logs, metrics and a `SessionRefreshFailed` event
//!
//! Only the snapshot column of a session is ever rewritten, so the session
//! lifecycle fields stay owned by whoever manages logins. There is no lock:
//! two requests racing through a signature change both re-resolve and write
//! the same result.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::resolver::CapabilityResolver;
use crate::domain::events::PolicyEvent;
use crate::domain::repository::{
    RepositoryError, SessionRepository, SettingsRepository, CAPABILITIES_SIGNATURE_SETTING,
};
use crate::domain::session::{Session, SessionId, SessionRole, SessionSnapshot};
use crate::domain::signature::PolicySignature;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Bypassed,
    Fresh,
    Refreshed,
    FailedOpen,
}

impl CacheOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::Bypassed => "bypassed",
            CacheOutcome::Fresh => "fresh",
            CacheOutcome::Refreshed => "refreshed",
            CacheOutcome::FailedOpen => "failed_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedSnapshot {
    pub snapshot: SessionSnapshot,
    pub outcome: CacheOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionCacheError {
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    #[error("Session {0} has expired")]
    SessionExpired(SessionId),

    #[error("Failed to read session: {0}")]
    Repository(#[from] RepositoryError),
}

pub struct SessionCapabilityCache {
    session_repository: Arc<dyn SessionRepository>,
    settings_repository: Arc<dyn SettingsRepository>,
    resolver: Arc<dyn CapabilityResolver>,
    event_bus: Arc<EventBus>,
}

impl SessionCapabilityCache {
    pub fn new(
        session_repository: Arc<dyn SessionRepository>,
        settings_repository: Arc<dyn SettingsRepository>,
        resolver: Arc<dyn CapabilityResolver>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            session_repository,
            settings_repository,
            resolver,
            event_bus,
        }
    }

    /// Compute and store the first snapshot of a freshly created session.
    ///
    /// When resolution fails the session gets an empty snapshot without a
    /// signature, which every later read treats as stale and retries.
    pub async fn establish(
        &self,
        session_id: SessionId,
    ) -> Result<SessionSnapshot, SessionCacheError> {
        let session = self.load(session_id).await?;

        let snapshot = match self.resolve(&session).await {
            Ok(snapshot) => snapshot,
            Err(reason) => {
                warn!(
                    "Could not resolve capabilities for session {} at login: {}",
                    session.id, reason
                );
                self.report_failure(&session, reason);
                SessionSnapshot::empty()
            }
        };

        self.session_repository.store_snapshot(session.id, &snapshot).await?;
        info!(
            "Session {} established with {} capabilities",
            session.id,
            snapshot.capabilities().len()
        );
        Ok(snapshot)
    }

    /// The snapshot to authorize the current request with.
    pub async fn snapshot(
        &self,
        session_id: SessionId,
    ) -> Result<CachedSnapshot, SessionCacheError> {
        let session = self.load(session_id).await?;

        let cached = match self.live_signature().await {
            Ok(None) => {
                debug!(
                    "No live capabilities signature; serving stored snapshot of session {}",
                    session.id
                );
                CachedSnapshot {
                    snapshot: session.snapshot,
                    outcome: CacheOutcome::Bypassed,
                }
            }
            Ok(Some(live)) if session.snapshot.is_fresh(&live) => {
                debug!("Snapshot of session {} is fresh", session.id);
                CachedSnapshot {
                    snapshot: session.snapshot,
                    outcome: CacheOutcome::Fresh,
                }
            }
            Ok(Some(live)) => self.refresh(session, live).await,
            Err(e) => self.fail_open(session, format!("failed to read live signature: {}", e)),
        };

        metrics::counter!(
            "warden_session_capability_cache_total",
            "outcome" => cached.outcome.as_str()
        )
        .increment(1);
        Ok(cached)
    }

    async fn refresh(&self, session: Session, live: PolicySignature) -> CachedSnapshot {
        let previous_signature = session.snapshot.capabilities_signature().cloned();

        let snapshot = match self.resolve_against(&session, Some(live)).await {
            Ok(snapshot) => snapshot,
            Err(reason) => return self.fail_open(session, reason),
        };

        if let Err(e) = self.session_repository.store_snapshot(session.id, &snapshot).await {
            return self.fail_open(session, format!("failed to store refreshed snapshot: {}", e));
        }

        info!(
            "Refreshed capabilities of session {} ({} -> {})",
            session.id,
            previous_signature.as_ref().map(PolicySignature::short).unwrap_or("none"),
            snapshot.capabilities_signature().map(PolicySignature::short).unwrap_or("none"),
        );
        self.event_bus.publish_policy_event(PolicyEvent::SessionCapabilitiesRefreshed {
            session_id: session.id,
            user_id: session.user_id,
            previous_signature,
            signature: snapshot.capabilities_signature().cloned(),
            capability_count: snapshot.capabilities().len(),
            refreshed_at: Utc::now(),
        });

        CachedSnapshot {
            snapshot,
            outcome: CacheOutcome::Refreshed,
        }
    }

    fn fail_open(&self, session: Session, reason: String) -> CachedSnapshot {
        warn!(
            "Capability refresh failed for session {}; serving previous snapshot: {}",
            session.id, reason
        );
        self.report_failure(&session, reason);
        CachedSnapshot {
            snapshot: session.snapshot,
            outcome: CacheOutcome::FailedOpen,
        }
    }

    fn report_failure(&self, session: &Session, reason: String) {
        self.event_bus.publish_policy_event(PolicyEvent::SessionRefreshFailed {
            session_id: session.id,
            user_id: session.user_id,
            reason,
            failed_at: Utc::now(),
        });
    }

    async fn load(&self, session_id: SessionId) -> Result<Session, SessionCacheError> {
        let session = self
            .session_repository
            .find_by_id(session_id)
            .await?
            .ok_or(SessionCacheError::SessionNotFound(session_id))?;

        if session.is_expired() {
            return Err(SessionCacheError::SessionExpired(session_id));
        }
        Ok(session)
    }

    async fn live_signature(&self) -> Result<Option<PolicySignature>, RepositoryError> {
        let raw = self.settings_repository.get(CAPABILITIES_SIGNATURE_SETTING).await?;
        Ok(raw.as_deref().and_then(PolicySignature::parse))
    }

    /// Resolve at login, stamping the snapshot with whatever signature is live.
    async fn resolve(&self, session: &Session) -> Result<SessionSnapshot, String> {
        let live = self
            .live_signature()
            .await
            .map_err(|e| format!("failed to read live signature: {}", e))?;
        self.resolve_against(session, live).await
    }

    async fn resolve_against(
        &self,
        session: &Session,
        live: Option<PolicySignature>,
    ) -> Result<SessionSnapshot, String> {
        let resolved = self
            .resolver
            .resolve_user(session.user_id)
            .await
            .map_err(|e| e.to_string())?;

        let roles = resolved.roles.iter().map(SessionRole::from).collect();
        Ok(SessionSnapshot::resolved(roles, resolved.capabilities, live))
    }
}
