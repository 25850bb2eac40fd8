// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Collection Diagnostics
//!
//! Problems found while collecting capability declarations are recorded as
//! [`Diagnostic`] values instead of being raised, so that one bad manifest or
//! entry never aborts collection of the rest.
//!
//! | Level | Effect |
//! |-------|--------|
//! | `Info` | Nothing excluded (e.g. a disabled plugin was skipped on purpose) |
//! | `Warning` | One entry skipped or collected as inert; processing continues |
//! | `Error` | A whole manifest was excluded; other manifests still contribute |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::domain::capability::{CapabilityKey, PluginId};
use crate::domain::role::RoleKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// What went wrong. Each invalid manifest shape maps to its own variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The manifest file could not be read.
    ManifestUnreadable { reason: String },
    /// The manifest is not valid JSON or does not match the manifest schema.
    ManifestInvalid { reason: String },
    /// The plugin is installed but disabled; its capabilities are not collected.
    PluginDisabled,
    /// A capability entry is not an object or does not match the entry schema.
    MalformedCapability { index: usize, reason: String },
    /// A capability entry has no usable `key`.
    MissingCapabilityKey { index: usize },
    /// A role entry is neither a role key nor `{role, value}`.
    MalformedRoleEntry { reason: String },
    /// After normalization the capability grants nothing to anyone.
    NoRoleAssignments,
    /// The role is not in the role catalog. The grant is still collected.
    UnknownRole,
    /// The capability key was already declared by another plugin.
    DuplicateCapability { claimed_by: PluginId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<CapabilityKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            level,
            kind,
            message: message.into(),
            plugin: None,
            capability: None,
            role: None,
            path: None,
        }
    }

    pub fn info(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, kind, message)
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, kind, message)
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, kind, message)
    }

    pub fn with_plugin(mut self, plugin: &PluginId) -> Self {
        self.plugin = Some(plugin.clone());
        self
    }

    pub fn with_capability(mut self, capability: &CapabilityKey) -> Self {
        self.capability = Some(capability.clone());
        self
    }

    pub fn with_role(mut self, role: &RoleKey) -> Self {
        self.role = Some(role.clone());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)?;
        if let Some(plugin) = &self.plugin {
            write!(f, " (plugin: {})", plugin)?;
        }
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

/// Count diagnostics per level, in `(info, warning, error)` order.
pub fn summarize(diagnostics: &[Diagnostic]) -> (usize, usize, usize) {
    diagnostics.iter().fold((0, 0, 0), |(i, w, e), d| match d.level {
        DiagnosticLevel::Info => (i + 1, w, e),
        DiagnosticLevel::Warning => (i, w + 1, e),
        DiagnosticLevel::Error => (i, w, e + 1),
    })
}
