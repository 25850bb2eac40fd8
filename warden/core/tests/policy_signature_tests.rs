// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Signature determinism and sensitivity across real plugin directories.
//!
//! The same set of declarations must always hash to the same signature no
//! matter in which order plugins were installed or capabilities were listed,
//! while any change to a grant must change it.

use std::path::Path;

use warden_core::application::collector::CapabilityCollector;
use warden_core::domain::role::RoleCatalog;
use warden_core::domain::signature::PolicySignature;

fn write_plugin(root: &Path, dir: &str, json: &str) {
    let plugin = root.join(dir);
    std::fs::create_dir_all(&plugin).unwrap();
    std::fs::write(plugin.join("plugin.json"), json).unwrap();
}

fn catalog() -> RoleCatalog {
    RoleCatalog::from_keys(["admin", "editor", "viewer"])
}

fn signature_of(root: &Path) -> PolicySignature {
    CapabilityCollector::new(2).collect(root, &catalog()).unwrap().signature
}

const BOARDS: &str = r#"{"id": "boards", "capabilities": [
    {"key": "boards.export", "roles": ["editor", {"role": "viewer", "value": "scoped"}]},
    {"key": "boards.view", "roles": ["viewer"]}
]}"#;

const BOARDS_REORDERED: &str = r#"{"id": "boards", "capabilities": [
    {"key": "boards.view", "roles": ["viewer"]},
    {"key": "boards.export", "roles": [{"role": "viewer", "value": "scoped"}, "editor"]}
]}"#;

const BILLING: &str = r#"{"id": "billing", "capabilities": [
    {"key": "billing.invoices.read", "roles": [{"role": "admin", "value": "compliance"}]}
]}"#;

#[test]
fn test_signature_independent_of_install_and_declaration_order() {
    let first = tempfile::tempdir().unwrap();
    write_plugin(first.path(), "boards", BOARDS);
    write_plugin(first.path(), "billing", BILLING);

    let second = tempfile::tempdir().unwrap();
    write_plugin(second.path(), "billing", BILLING);
    write_plugin(second.path(), "boards", BOARDS_REORDERED);

    assert_eq!(signature_of(first.path()), signature_of(second.path()));
}

#[test]
fn test_signature_stable_across_repeated_collection() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), "boards", BOARDS);
    write_plugin(dir.path(), "billing", BILLING);

    let runs: Vec<_> = (0..3).map(|_| signature_of(dir.path())).collect();
    assert!(runs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_signature_changes_with_policy() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), "boards", BOARDS);
    let base = signature_of(dir.path());

    // Value change
    write_plugin(
        dir.path(),
        "boards",
        &BOARDS.replace(r#""value": "scoped""#, r#""value": "anonymized""#),
    );
    let changed_value = signature_of(dir.path());
    assert_ne!(base, changed_value);

    // Grant removed
    write_plugin(
        dir.path(),
        "boards",
        r#"{"id": "boards", "capabilities": [
            {"key": "boards.export", "roles": ["editor"]},
            {"key": "boards.view", "roles": ["viewer"]}
        ]}"#,
    );
    let removed_grant = signature_of(dir.path());
    assert_ne!(base, removed_grant);
    assert_ne!(changed_value, removed_grant);

    // Capability added by a new plugin
    write_plugin(dir.path(), "boards", BOARDS);
    write_plugin(dir.path(), "billing", BILLING);
    let added = signature_of(dir.path());
    assert_ne!(base, added);

    // Plugin disabled: back to the original policy set
    write_plugin(
        dir.path(),
        "billing",
        &BILLING.replacen('{', r#"{"enabled": false, "#, 1),
    );
    assert_eq!(signature_of(dir.path()), base);
}

#[test]
fn test_descriptions_do_not_affect_signature() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), "boards", BOARDS);
    let base = signature_of(dir.path());

    write_plugin(
        dir.path(),
        "boards",
        &BOARDS.replace(
            r#""key": "boards.view","#,
            r#""key": "boards.view", "description": "Open a board", "tags": ["read"],"#,
        ),
    );
    assert_eq!(signature_of(dir.path()), base);
}
