// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::capability::CapabilityKey;
use crate::domain::role::UserId;
use crate::domain::session::SessionId;
use crate::domain::signature::PolicySignature;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicyEvent {
    PolicySeeded {
        signature: PolicySignature,
        capability_count: usize,
        assignment_count: usize,
        skipped_assignments: usize,
        seeded_at: DateTime<Utc>,
    },
    PolicyDrifted {
        signature: PolicySignature,
        added: Vec<CapabilityKey>,
        removed: Vec<CapabilityKey>,
        detected_at: DateTime<Utc>,
    },
    SessionCapabilitiesRefreshed {
        session_id: SessionId,
        user_id: UserId,
        previous_signature: Option<PolicySignature>,
        signature: Option<PolicySignature>,
        capability_count: usize,
        refreshed_at: DateTime<Utc>,
    },
    /// A stale session kept its last-known-good snapshot because resolution failed.
    SessionRefreshFailed {
        session_id: SessionId,
        user_id: UserId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}
