// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capability policy commands
//!
//! Commands: seed, inspect, resolve
//!
//! # Usage
//!
//! ```bash
//! # Collect plugin capabilities and write them to storage
//! warden policy seed
//!
//! # Preview drift without writing anything
//! warden policy seed --dry-run
//!
//! # Show what the installed plugins declare
//! warden policy inspect --json
//!
//! # Effective capabilities of one user
//! warden policy resolve --user 7f0c2a1e-...
//! ```

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use warden_core::application::collector::{CapabilityCollector, CollectedPolicy};
use warden_core::application::repository_factory::{create_repositories, Repositories};
use warden_core::application::resolver::{CapabilityResolver, PrecedenceResolver};
use warden_core::application::seeder::{PolicySeeder, SeedOptions, SeedReport};
use warden_core::domain::capability::Capability;
use warden_core::domain::config::WardenConfig;
use warden_core::domain::diagnostic::{summarize, Diagnostic, DiagnosticLevel};
use warden_core::domain::repository::{StorageBackend, CAPABILITIES_SIGNATURE_SETTING};
use warden_core::domain::role::{Role, RoleCatalog, UserId};
use warden_core::domain::signature::PolicySignature;
use warden_core::infrastructure::event_bus::EventBus;
use warden_core::infrastructure::policy_state_file::JsonFilePolicyStateStore;

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Collect plugin capabilities and seed them into storage
    Seed {
        /// Report drift without writing to storage or the state file
        #[arg(long)]
        dry_run: bool,

        /// Fail when any plugin manifest could not be read or parsed
        #[arg(long)]
        strict: bool,

        /// Plugin directory (default: spec.policy.plugins_dir)
        #[arg(long, value_name = "DIR")]
        plugins_dir: Option<PathBuf>,

        /// Policy state file (default: spec.policy.state_file)
        #[arg(long, value_name = "FILE")]
        state_file: Option<PathBuf>,
    },

    /// Show collected capabilities, grants and diagnostics without writing anything
    Inspect {
        /// Plugin directory (default: spec.policy.plugins_dir)
        #[arg(long, value_name = "DIR")]
        plugins_dir: Option<PathBuf>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective capability map of a user
    Resolve {
        /// User ID
        #[arg(long, value_name = "UUID")]
        user: Uuid,
    },
}

pub async fn handle_command(
    command: PolicyCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    let config =
        WardenConfig::load_or_default(config_override).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    match command {
        PolicyCommand::Seed {
            dry_run,
            strict,
            plugins_dir,
            state_file,
        } => seed(&config, dry_run, strict, plugins_dir, state_file).await,
        PolicyCommand::Inspect { plugins_dir, json } => inspect(&config, plugins_dir, json).await,
        PolicyCommand::Resolve { user } => resolve(&config, user).await,
    }
}

/// Open storage and read the role catalog the collector should check against.
async fn open_repositories(
    config: &WardenConfig,
) -> Result<(StorageBackend, Repositories, RoleCatalog)> {
    let backend = config.storage_backend()?;
    let repositories = create_repositories(&backend, &config.role_catalog())
        .await
        .context("Failed to open storage")?;

    let roles = repositories.roles.list_all().await.context("Failed to read role catalog")?;
    let catalog = RoleCatalog::new(roles.iter().map(Role::definition).collect());

    Ok((backend, repositories, catalog))
}

fn collect(
    config: &WardenConfig,
    plugins_dir: Option<PathBuf>,
    catalog: &RoleCatalog,
) -> Result<CollectedPolicy> {
    let root = plugins_dir.unwrap_or_else(|| config.spec.policy.plugins_dir.clone());
    CapabilityCollector::new(config.spec.policy.manifest_depth)
        .collect(&root, catalog)
        .with_context(|| format!("Failed to collect capabilities from {:?}", root))
}

async fn seed(
    config: &WardenConfig,
    dry_run: bool,
    strict: bool,
    plugins_dir: Option<PathBuf>,
    state_file: Option<PathBuf>,
) -> Result<()> {
    println!("{}", "Warden Policy Seed".bold().green());

    let (backend, repositories, catalog) = open_repositories(config).await?;
    let options = seed_options(&backend, dry_run);
    if options.dry_run && !dry_run {
        println!(
            "{}",
            "⚠ storage.backend is in_memory: grants would be lost on exit, running as --dry-run"
                .yellow()
        );
    }

    let policy = collect(config, plugins_dir, &catalog)?;
    print_diagnostics(&policy.diagnostics);

    if (strict || config.spec.policy.strict) && policy.has_errors() {
        anyhow::bail!("Collection produced error diagnostics; refusing to seed in strict mode");
    }

    let state_file = state_file.unwrap_or_else(|| config.spec.policy.state_file.clone());
    let seeder = PolicySeeder::new(
        repositories.capabilities,
        repositories.roles,
        repositories.settings,
        Arc::new(JsonFilePolicyStateStore::new(&state_file)),
        Arc::new(EventBus::default()),
    );

    let report = seeder
        .seed(&policy, options)
        .await
        .context("Policy seeding failed")?;

    tracing::info!(
        signature = %report.signature,
        added = report.drift.added.len(),
        removed = report.drift.removed.len(),
        dry_run = report.dry_run,
        "policy seed finished"
    );

    print_report(&report, &state_file);
    Ok(())
}

/// In-memory storage forgets every grant on exit. Seeding it for real would
/// still advance the state file and hide the drift from the next run.
fn seed_options(backend: &StorageBackend, dry_run: bool) -> SeedOptions {
    SeedOptions {
        dry_run: dry_run || matches!(backend, StorageBackend::InMemory),
    }
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    signature: &'a PolicySignature,
    capabilities: &'a [Capability],
    diagnostics: &'a [Diagnostic],
}

async fn inspect(config: &WardenConfig, plugins_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let (_, _, catalog) = open_repositories(config).await?;
    let policy = collect(config, plugins_dir, &catalog)?;

    if json {
        let output = InspectOutput {
            signature: &policy.signature,
            capabilities: &policy.capabilities,
            diagnostics: &policy.diagnostics,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if policy.capabilities.is_empty() {
        println!("{}", "No capabilities declared".yellow());
    } else {
        println!("{} capabilities declared:", policy.capabilities.len());
        println!("{:<40} {:<20} {}", "KEY", "SOURCE", "GRANTS");
        for capability in &policy.capabilities {
            let grants: Vec<String> =
                capability.assignments.iter().map(|g| g.canonical()).collect();
            println!(
                "{:<40} {:<20} {}",
                capability.key.as_str().bold(),
                capability.source,
                if grants.is_empty() {
                    "(none)".dimmed().to_string()
                } else {
                    grants.join(", ")
                }
            );
        }
    }
    println!();
    print_diagnostics(&policy.diagnostics);
    println!("Signature: {}", policy.signature);

    Ok(())
}

async fn resolve(config: &WardenConfig, user: Uuid) -> Result<()> {
    let (_, repositories, _) = open_repositories(config).await?;

    let resolver = PrecedenceResolver::new(
        repositories.capabilities,
        repositories.roles,
        repositories.assignments,
    )
    .with_baseline_role(config.spec.policy.baseline_role.clone());

    let resolved = resolver
        .resolve_user(UserId(user))
        .await
        .with_context(|| format!("Failed to resolve capabilities of user {}", user))?;

    let roles: Vec<&str> = resolved.roles.iter().map(|r| r.key.as_str()).collect();
    println!("User: {}", user);
    println!(
        "Roles: {}",
        if roles.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            roles.join(", ")
        }
    );

    let live = repositories.settings.get(CAPABILITIES_SIGNATURE_SETTING).await?;
    println!(
        "Live signature: {}",
        live.as_deref().unwrap_or("(not published)")
    );
    println!();

    if resolved.capabilities.is_empty() {
        println!("{}", "No capabilities granted".yellow());
        return Ok(());
    }

    println!("{:<40} {}", "CAPABILITY", "VALUE");
    for (key, value) in &resolved.capabilities {
        println!("{:<40} {}", key.as_str(), value);
    }

    Ok(())
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let line = diagnostic.to_string();
        match diagnostic.level {
            DiagnosticLevel::Info => println!("{}", line.dimmed()),
            DiagnosticLevel::Warning => println!("{}", line.yellow()),
            DiagnosticLevel::Error => println!("{}", line.red()),
        }
    }

    let (infos, warnings, errors) = summarize(diagnostics);
    if infos + warnings + errors > 0 {
        println!("Diagnostics: {} info, {} warnings, {} errors", infos, warnings, errors);
    }
}

fn print_report(report: &SeedReport, state_file: &Path) {
    for skipped in &report.skipped_assignments {
        println!(
            "{}",
            format!(
                "⚠ Skipped grant of {} to unknown role {}",
                skipped.capability, skipped.role
            )
            .yellow()
        );
    }
    for key in &report.drift.removed {
        println!("{}", format!("- {} (no longer declared)", key).yellow());
    }
    for key in &report.drift.added {
        println!("{}", format!("+ {}", key).green());
    }

    println!(
        "Capabilities: {}, grants: {}, revoked: {}, skipped: {}",
        report.capabilities_upserted,
        report.assignments_upserted,
        report.assignments_revoked,
        report.skipped_assignments.len()
    );
    println!("Signature: {}", report.signature);

    if report.dry_run {
        println!("Skipping writes due to --dry-run");
    } else if report.signature_changed() {
        println!(
            "{}",
            format!("✓ Policy seeded; state written to {}", state_file.display()).green()
        );
    } else {
        println!("{}", "✓ Policy unchanged".green());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::domain::repository::PostgresConfig;

    #[test]
    fn test_in_memory_backend_always_seeds_as_dry_run() {
        assert!(seed_options(&StorageBackend::InMemory, false).dry_run);
        assert!(seed_options(&StorageBackend::InMemory, true).dry_run);
    }

    #[test]
    fn test_postgres_backend_honors_dry_run_flag() {
        let backend = StorageBackend::PostgreSQL(PostgresConfig {
            connection_string: "postgres://localhost/warden".to_string(),
        });
        assert!(!seed_options(&backend, false).dry_run);
        assert!(seed_options(&backend, true).dry_run);
    }
}
