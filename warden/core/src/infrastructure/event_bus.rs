// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Domain Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Seeding runs and session cache refreshes publish here so that audit
// writers and operators can observe policy changes as they happen.
//
// In-memory only: events are lost on restart.

use crate::domain::events::PolicyEvent;
use crate::domain::session::SessionId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Policy(PolicyEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a policy event
    pub fn publish_policy_event(&self, event: PolicyEvent) {
        self.publish(DomainEvent::Policy(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to cache events of a single session
    pub fn subscribe_session(&self, session_id: SessionId) -> SessionEventReceiver {
        SessionEventReceiver {
            receiver: self.sender.subscribe(),
            session_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for events about one session (filtered)
pub struct SessionEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    session_id: SessionId,
}

impl SessionEventReceiver {
    pub async fn recv(&mut self) -> Result<PolicyEvent, EventBusError> {
        loop {
            let DomainEvent::Policy(event) = self.receiver.recv().await.map_err(map_recv_error)?;
            if self.matches_session(&event) {
                return Ok(event);
            }
        }
    }

    fn matches_session(&self, event: &PolicyEvent) -> bool {
        match event {
            PolicyEvent::SessionCapabilitiesRefreshed { session_id, .. }
            | PolicyEvent::SessionRefreshFailed { session_id, .. } => {
                session_id == &self.session_id
            }
            PolicyEvent::PolicySeeded { .. } | PolicyEvent::PolicyDrifted { .. } => false,
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::UserId;
    use crate::domain::signature::PolicySignature;
    use chrono::Utc;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let signature = PolicySignature::compute(&[]);
        event_bus.publish_policy_event(PolicyEvent::PolicySeeded {
            signature: signature.clone(),
            capability_count: 3,
            assignment_count: 5,
            skipped_assignments: 0,
            seeded_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::Policy(PolicyEvent::PolicySeeded {
                signature: sig,
                capability_count,
                ..
            }) => {
                assert_eq!(sig, signature);
                assert_eq!(capability_count, 3);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_event_filtering() {
        let event_bus = EventBus::new(10);
        let session_id = SessionId::new();
        let mut receiver = event_bus.subscribe_session(session_id);

        event_bus.publish_policy_event(PolicyEvent::SessionRefreshFailed {
            session_id: SessionId::new(),
            user_id: UserId::new(),
            reason: "other session".to_string(),
            failed_at: Utc::now(),
        });
        event_bus.publish_policy_event(PolicyEvent::SessionRefreshFailed {
            session_id,
            user_id: UserId::new(),
            reason: "storage unavailable".to_string(),
            failed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            PolicyEvent::SessionRefreshFailed { session_id: id, reason, .. } => {
                assert_eq!(id, session_id);
                assert_eq!(reason, "storage unavailable");
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let event_bus = EventBus::default();
        assert_eq!(event_bus.subscriber_count(), 0);
        event_bus.publish_policy_event(PolicyEvent::PolicyDrifted {
            signature: PolicySignature::compute(&[]),
            added: vec![],
            removed: vec![],
            detected_at: Utc::now(),
        });
    }
}
