// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Update Command
//!
//! Implements `warden update`: applies the core's SQL migrations so the
//! PostgreSQL schema (roles, capabilities, grants, sessions, settings) matches
//! the binary.
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! warden update
//!
//! # Preview migrations without applying
//! warden update --dry-run
//! ```
//!
//! # Environment
//!
//! The database URL comes from `spec.storage.database_url` or
//! `WARDEN_DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;

use warden_core::domain::config::WardenConfig;
use warden_core::domain::repository::StorageBackend;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../warden/core/migrations");

#[derive(Args)]
pub struct UpdateCommand {
    /// Perform a dry run without applying changes
    #[arg(long)]
    dry_run: bool,
}

pub async fn execute(cmd: UpdateCommand, config_override: Option<PathBuf>) -> Result<()> {
    println!("{}", "Warden Update".bold().green());

    let config =
        WardenConfig::load_or_default(config_override).context("Failed to load configuration")?;
    let database_url = match config.storage_backend()? {
        StorageBackend::PostgreSQL(pg) => pg.connection_string,
        StorageBackend::InMemory => anyhow::bail!(
            "storage.backend is in_memory. Set WARDEN_DATABASE_URL or \
             spec.storage.database_url to run updates."
        ),
    };

    println!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    // The table does not exist before the first run
    let applied_count = sqlx::query("SELECT version FROM _sqlx_migrations")
        .fetch_all(&pool)
        .await
        .map(|rows| rows.len())
        .unwrap_or(0);

    let total_migrations = MIGRATOR.iter().count();

    println!(
        "Migration status: {} applied, {} total available.",
        applied_count, total_migrations
    );

    if applied_count >= total_migrations {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in MIGRATOR.iter().skip(applied_count) {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    MIGRATOR.run(&pool).await.context("Failed to apply migrations")?;
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}
