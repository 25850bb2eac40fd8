// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Plugin Manifest Parser
//!
//! This module provides infrastructure for discovering installed plugin
//! manifests and parsing their capability declarations.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external JSON → typed manifest structures
//! - **Anti-Corruption:** Each capability and role entry is parsed on its own so
//!   one malformed entry never invalidates its siblings
//!
//! # Manifest Format
//!
//! ```json
//! {
//!   "id": "boards",
//!   "namespace": "boards",
//!   "version": "2.1.0",
//!   "capabilities": [
//!     {
//!       "key": "boards.export",
//!       "description": "Export a board",
//!       "category": "boards",
//!       "tags": ["export"],
//!       "roles": ["editor", {"role": "viewer", "value": "scoped"}]
//!     }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::domain::capability::CapabilityValue;

pub const MANIFEST_FILE_NAME: &str = "plugin.json";

// ============================================================================
// Manifest Schema
// ============================================================================

/// Top-level plugin manifest. Capability entries stay as raw JSON values until
/// they are validated one by one.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub capabilities: Vec<Value>,
}

fn default_enabled() -> bool {
    true
}

/// One entry of the manifest `capabilities` array.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityDeclaration {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Raw role entries, validated individually by [`RoleEntry::parse`].
    #[serde(default)]
    pub roles: Vec<Value>,
}

/// A role entry: a bare role key (implies `allow`) or `{role, value}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RoleEntry {
    Bare(String),
    Detailed {
        role: String,
        #[serde(default)]
        value: Option<CapabilityValue>,
    },
}

impl RoleEntry {
    /// Validate one raw role entry into `(role_key, value)`.
    pub fn parse(raw: &Value) -> Result<(String, CapabilityValue), String> {
        let entry: RoleEntry = serde_json::from_value(raw.clone()).map_err(|_| {
            format!(
                "expected a role key or {{\"role\", \"value\"}} with value one of \
                 allow, consent, compliance, scoped, anonymized, deny; got {}",
                raw
            )
        })?;

        let (role, value) = match entry {
            RoleEntry::Bare(role) => (role, CapabilityValue::default()),
            RoleEntry::Detailed { role, value } => (role, value.unwrap_or_default()),
        };

        let role = role.trim().to_string();
        if role.is_empty() {
            return Err("role key is empty".to_string());
        }
        Ok((role, value))
    }
}

/// Why a single capability entry could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    MissingKey,
    Malformed(String),
}

impl CapabilityDeclaration {
    /// Validate one raw capability entry.
    pub fn parse(raw: &Value) -> Result<Self, DeclarationError> {
        let object = raw.as_object().ok_or_else(|| {
            DeclarationError::Malformed(format!("expected an object, got {}", raw))
        })?;

        let has_key = object
            .get("key")
            .and_then(Value::as_str)
            .is_some_and(|k| !k.trim().is_empty());
        if !has_key {
            return Err(DeclarationError::MissingKey);
        }

        let mut declaration: CapabilityDeclaration = serde_json::from_value(raw.clone())
            .map_err(|e| DeclarationError::Malformed(e.to_string()))?;
        declaration.key = declaration.key.trim().to_string();
        Ok(declaration)
    }
}

// ============================================================================
// Parser API
// ============================================================================

pub struct PluginManifestParser;

impl PluginManifestParser {
    /// Parse a plugin manifest from a JSON string
    pub fn parse_json(json: &str) -> Result<PluginManifest> {
        serde_json::from_str(json).context("Failed to parse plugin manifest JSON")
    }

    /// Parse a plugin manifest from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<PluginManifest> {
        let json = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read manifest file: {:?}", path.as_ref()))?;

        Self::parse_json(&json)
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// A manifest file found on disk together with its raw contents.
#[derive(Debug)]
pub struct ManifestSource {
    pub path: PathBuf,
    /// Name of the directory containing the manifest; fallback plugin id.
    pub dir_name: String,
    pub contents: std::io::Result<String>,
}

impl ManifestSource {
    pub fn read(path: PathBuf) -> Self {
        let dir_name = path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let contents = std::fs::read_to_string(&path);
        Self { path, dir_name, contents }
    }

    pub fn from_string(
        path: impl Into<PathBuf>,
        dir_name: impl Into<String>,
        contents: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            dir_name: dir_name.into(),
            contents: Ok(contents.into()),
        }
    }
}

/// Finds `plugin.json` files below a plugin root.
pub struct PluginManifestScanner {
    max_depth: usize,
}

impl PluginManifestScanner {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Every manifest below `root`, sorted by path. Directory entries that cannot
    /// be walked are returned as sources whose `contents` carry the error.
    pub fn discover(&self, root: &Path) -> Result<Vec<ManifestSource>> {
        if !root.is_dir() {
            anyhow::bail!("Plugin directory does not exist or is not a directory: {:?}", root);
        }

        let mut sources = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(self.max_depth).sort_by_file_name() {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE_NAME {
                        sources.push(ManifestSource::read(entry.into_path()));
                    }
                }
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    let dir_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let io_err = std::io::Error::other(err.to_string());
                    sources.push(ManifestSource {
                        path,
                        dir_name,
                        contents: Err(io_err),
                    });
                }
            }
        }

        sources.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(sources)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_manifest() {
        let manifest = PluginManifestParser::parse_json(r#"{"capabilities": []}"#).unwrap();
        assert!(manifest.id.is_none());
        assert!(manifest.enabled);
        assert!(manifest.capabilities.is_empty());
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(PluginManifestParser::parse_json("{ not json").is_err());
        assert!(PluginManifestParser::parse_json(r#"{"capabilities": "boards.export"}"#).is_err());
    }

    #[test]
    fn test_role_entry_forms() {
        assert_eq!(
            RoleEntry::parse(&json!("editor")).unwrap(),
            ("editor".to_string(), CapabilityValue::Allow)
        );
        assert_eq!(
            RoleEntry::parse(&json!({"role": "viewer", "value": "scoped"})).unwrap(),
            ("viewer".to_string(), CapabilityValue::Scoped)
        );
        assert_eq!(
            RoleEntry::parse(&json!({"role": "viewer"})).unwrap(),
            ("viewer".to_string(), CapabilityValue::Allow)
        );
        assert!(RoleEntry::parse(&json!({"role": "viewer", "value": "admin"})).is_err());
        assert!(RoleEntry::parse(&json!({"value": "allow"})).is_err());
        assert!(RoleEntry::parse(&json!(42)).is_err());
        assert!(RoleEntry::parse(&json!("  ")).is_err());
    }

    #[test]
    fn test_declaration_requires_key() {
        assert_eq!(
            CapabilityDeclaration::parse(&json!({"description": "no key"})).unwrap_err(),
            DeclarationError::MissingKey
        );
        assert_eq!(
            CapabilityDeclaration::parse(&json!({"key": "  "})).unwrap_err(),
            DeclarationError::MissingKey
        );
        assert!(matches!(
            CapabilityDeclaration::parse(&json!("boards.export")),
            Err(DeclarationError::Malformed(_))
        ));
        assert!(matches!(
            CapabilityDeclaration::parse(&json!({"key": "boards.export", "tags": "export"})),
            Err(DeclarationError::Malformed(_))
        ));

        let decl =
            CapabilityDeclaration::parse(&json!({"key": " boards.export ", "roles": ["editor"]}))
                .unwrap();
        assert_eq!(decl.key, "boards.export");
        assert_eq!(decl.roles.len(), 1);
    }

    #[test]
    fn test_discover_sorted_and_depth_limited() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            let plugin = dir.path().join(name);
            std::fs::create_dir_all(&plugin).unwrap();
            std::fs::write(plugin.join(MANIFEST_FILE_NAME), r#"{"capabilities": []}"#).unwrap();
        }
        let deep = dir.path().join("mid").join("vendor").join("nested");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join(MANIFEST_FILE_NAME), "{}").unwrap();
        std::fs::write(dir.path().join("alpha").join("README.md"), "docs").unwrap();

        let sources = PluginManifestScanner::new(2).discover(dir.path()).unwrap();
        let names: Vec<_> = sources.iter().map(|s| s.dir_name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert!(sources.iter().all(|s| s.contents.is_ok()));
    }

    #[test]
    fn test_discover_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PluginManifestScanner::new(2).discover(&dir.path().join("nope")).is_err());
    }
}
