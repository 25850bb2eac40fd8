// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capability Collector
//!
//! Walks the installed plugins, parses every `plugin.json` and folds the
//! declarations into one normalized capability set plus diagnostics.
//!
//! # Flow
//!
//! 1. Discover manifests below the plugin root (sorted by path)
//! 2. Parse each manifest; unreadable or invalid ones become error diagnostics
//! 3. Validate capability and role entries one at a time
//! 4. Normalize, sort by `(key, source)` and compute the policy signature
//!
//! Collection never fails half-way: bad input is reported as a [`Diagnostic`]
//! and the rest of the plugins are still collected.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::domain::capability::{Capability, CapabilityKey, PluginId};
use crate::domain::diagnostic::{summarize, Diagnostic, DiagnosticKind};
use crate::domain::role::{RoleCatalog, RoleKey};
use crate::domain::signature::PolicySignature;
use crate::infrastructure::plugin_manifest::{
    CapabilityDeclaration, DeclarationError, ManifestSource, PluginManifest, PluginManifestParser,
    PluginManifestScanner, RoleEntry,
};

/// Output of one collection pass.
#[derive(Debug, Clone)]
pub struct CollectedPolicy {
    pub capabilities: Vec<Capability>,
    pub diagnostics: Vec<Diagnostic>,
    pub signature: PolicySignature,
}

impl CollectedPolicy {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Total number of role grants across all capabilities.
    pub fn assignment_count(&self) -> usize {
        self.capabilities.iter().map(|c| c.assignments.len()).sum()
    }

    pub fn find(&self, key: &CapabilityKey) -> Option<&Capability> {
        self.capabilities.iter().find(|c| &c.key == key)
    }
}

pub struct CapabilityCollector {
    scanner: PluginManifestScanner,
}

impl CapabilityCollector {
    pub fn new(manifest_depth: usize) -> Self {
        Self {
            scanner: PluginManifestScanner::new(manifest_depth),
        }
    }

    /// Collect every capability declared below `root`.
    ///
    /// Only a missing plugin root is an error; everything else is a diagnostic.
    pub fn collect(&self, root: &Path, catalog: &RoleCatalog) -> Result<CollectedPolicy> {
        let sources = self.scanner.discover(root)?;
        info!("Discovered {} plugin manifest(s) under {:?}", sources.len(), root);
        Ok(Self::collect_sources(sources, catalog))
    }

    /// Fold already-read manifests. The order of `sources` does not matter.
    pub fn collect_sources(
        mut sources: Vec<ManifestSource>,
        catalog: &RoleCatalog,
    ) -> CollectedPolicy {
        sources.sort_by(|a, b| a.path.cmp(&b.path));

        let mut fold = Fold {
            catalog,
            capabilities: BTreeMap::new(),
            diagnostics: Vec::new(),
        };

        for source in sources {
            fold.source(source);
        }

        let Fold {
            capabilities,
            diagnostics,
            ..
        } = fold;

        let mut capabilities: Vec<Capability> = capabilities.into_values().collect();
        capabilities.sort_by(|a, b| (&a.key, &a.source).cmp(&(&b.key, &b.source)));
        let signature = PolicySignature::compute(&capabilities);

        let (infos, warnings, errors) = summarize(&diagnostics);
        info!(
            "Collected {} capabilities ({} info, {} warnings, {} errors), signature {}",
            capabilities.len(),
            infos,
            warnings,
            errors,
            signature.short()
        );

        CollectedPolicy {
            capabilities,
            diagnostics,
            signature,
        }
    }
}

struct Fold<'a> {
    catalog: &'a RoleCatalog,
    capabilities: BTreeMap<CapabilityKey, Capability>,
    diagnostics: Vec<Diagnostic>,
}

impl Fold<'_> {
    fn source(&mut self, source: ManifestSource) {
        let contents = match source.contents {
            Ok(contents) => contents,
            Err(e) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::ManifestUnreadable { reason: e.to_string() },
                        "plugin manifest could not be read",
                    )
                    .with_path(&source.path),
                );
                return;
            }
        };

        let manifest = match PluginManifestParser::parse_json(&contents) {
            Ok(manifest) => manifest,
            Err(e) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        DiagnosticKind::ManifestInvalid {
                            reason: format!("{:#}", e),
                        },
                        "plugin manifest is not a valid manifest",
                    )
                    .with_path(&source.path),
                );
                return;
            }
        };

        let plugin = non_blank(manifest.id.as_deref())
            .map(PluginId::new)
            .unwrap_or_else(|| PluginId::new(source.dir_name.clone()));

        if !manifest.enabled {
            self.diagnostics.push(
                Diagnostic::info(
                    DiagnosticKind::PluginDisabled,
                    "plugin is disabled; capabilities skipped",
                )
                .with_plugin(&plugin)
                .with_path(&source.path),
            );
            return;
        }

        debug!(
            "Collecting {} capability entries from plugin {}",
            manifest.capabilities.len(),
            plugin
        );
        self.manifest(&plugin, &manifest, &source.path);
    }

    fn manifest(&mut self, plugin: &PluginId, manifest: &PluginManifest, path: &Path) {
        let namespace = non_blank(manifest.namespace.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| plugin.as_str().to_string());

        for (index, raw) in manifest.capabilities.iter().enumerate() {
            let declaration = match CapabilityDeclaration::parse(raw) {
                Ok(declaration) => declaration,
                Err(DeclarationError::MissingKey) => {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::MissingCapabilityKey { index },
                            format!("capability entry #{} has no key", index),
                        )
                        .with_plugin(plugin)
                        .with_path(path),
                    );
                    continue;
                }
                Err(DeclarationError::Malformed(reason)) => {
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::MalformedCapability { index, reason },
                            format!("capability entry #{} is malformed", index),
                        )
                        .with_plugin(plugin)
                        .with_path(path),
                    );
                    continue;
                }
            };

            let key = CapabilityKey::new(declaration.key.clone());
            if let Some(existing) = self.capabilities.get(&key) {
                if &existing.source != plugin {
                    let claimed_by = existing.source.clone();
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::DuplicateCapability { claimed_by: claimed_by.clone() },
                            format!(
                                "capability {} is already declared by plugin {}",
                                key, claimed_by
                            ),
                        )
                        .with_plugin(plugin)
                        .with_capability(&key)
                        .with_path(path),
                    );
                    continue;
                }
            }

            let capability = self.capability(plugin, &namespace, key, declaration, path);
            self.capabilities.insert(capability.key.clone(), capability);
        }
    }

    fn capability(
        &mut self,
        plugin: &PluginId,
        namespace: &str,
        key: CapabilityKey,
        declaration: CapabilityDeclaration,
        path: &Path,
    ) -> Capability {
        let mut capability = Capability::new(key, plugin.clone(), namespace);
        capability.description = declaration.description.unwrap_or_default();
        capability.scope = declaration.scope;
        capability.category = declaration.category;
        capability.tags = declaration.tags;
        capability.metadata = declaration.metadata;

        for raw in &declaration.roles {
            match RoleEntry::parse(raw) {
                Ok((role, value)) => capability.set_grant(RoleKey::new(role), value),
                Err(reason) => self.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::MalformedRoleEntry { reason },
                        format!("capability {} has a malformed role entry", capability.key),
                    )
                    .with_plugin(plugin)
                    .with_capability(&capability.key)
                    .with_path(path),
                ),
            }
        }

        capability.normalize();

        for grant in &capability.assignments {
            if !self.catalog.contains(&grant.role) {
                self.diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::UnknownRole,
                        format!("role {} is not in the role catalog", grant.role),
                    )
                    .with_plugin(plugin)
                    .with_capability(&capability.key)
                    .with_role(&grant.role)
                    .with_path(path),
                );
            }
        }

        if capability.assignments.is_empty() {
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::NoRoleAssignments,
                    format!("capability {} is not granted to any role", capability.key),
                )
                .with_plugin(plugin)
                .with_capability(&capability.key)
                .with_path(path),
            );
        }

        capability
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
