// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Signature
//!
//! A [`PolicySignature`] is a SHA-256 content hash over the canonical form of the
//! full capability set (capabilities × role grants). Consumers compare signatures
//! to detect "has the policy changed since I last saw it?" without loading the
//! policy itself.
//!
//! ## Canonical form
//!
//! ```text
//! [{"key": "...", "source": "...", "assignments": ["role:value", ...]}, ...]
//! ```
//!
//! `assignments` is sorted and the list is sorted by `key + source`, so neither
//! manifest discovery order nor declaration order affects the digest. Descriptive
//! fields (description, tags, metadata, ...) are deliberately not part of it: they
//! do not change what anyone is allowed to do.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::capability::Capability;

const ALGORITHM_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicySignature(String);

#[derive(Serialize)]
struct CanonicalCapability<'a> {
    key: &'a str,
    source: &'a str,
    assignments: Vec<String>,
}

impl PolicySignature {
    /// Compute the signature of a capability set. Pure; no I/O.
    pub fn compute(capabilities: &[Capability]) -> Self {
        let mut canonical: Vec<CanonicalCapability<'_>> = capabilities
            .iter()
            .map(|cap| {
                let mut assignments: Vec<String> =
                    cap.assignments.iter().map(|g| g.canonical()).collect();
                assignments.sort();
                CanonicalCapability {
                    key: cap.key.as_str(),
                    source: cap.source.as_str(),
                    assignments,
                }
            })
            .collect();
        canonical.sort_by(|a, b| {
            (a.key, a.source)
                .cmp(&(b.key, b.source))
                .then_with(|| a.assignments.cmp(&b.assignments))
        });

        // Serializing borrowed strings and vectors of strings cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        Self(format!("{}{}", ALGORITHM_PREFIX, hex::encode(digest)))
    }

    /// Wrap a signature read back from storage. Blank input means "no signature".
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines. Cuts on a char boundary, since stored
    /// values are not guaranteed to be hex.
    pub fn short(&self) -> &str {
        let hex = self.0.strip_prefix(ALGORITHM_PREFIX).unwrap_or(&self.0);
        hex.char_indices().nth(12).map_or(hex, |(i, _)| &hex[..i])
    }
}

impl fmt::Display for PolicySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
