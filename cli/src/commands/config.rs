// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use warden_core::domain::config::{StorageBackendKind, WardenConfig};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./warden-config.yaml)
        #[arg(short, long, default_value = "./warden-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = WardenConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. WARDEN_CONFIG_PATH: {}",
            std::env::var("WARDEN_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./warden-config.yaml");
        println!("  4. ~/.warden/config.yaml");
        println!("  5. /etc/warden/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Deployment:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    let policy = &config.spec.policy;
    println!("{}", "Policy:".bold());
    println!("  Plugins directory: {}", policy.plugins_dir.display());
    println!("  State file: {}", policy.state_file.display());
    println!("  Manifest depth: {}", policy.manifest_depth);
    println!(
        "  Baseline role: {}",
        policy.baseline_role.as_ref().map(|r| r.as_str()).unwrap_or("(none)")
    );
    println!("  Strict: {}", policy.strict);
    println!();

    println!("{}", "Storage:".bold());
    match config.spec.storage.backend {
        StorageBackendKind::InMemory => println!("  Backend: in_memory"),
        StorageBackendKind::Postgres => {
            println!("  Backend: postgres");
            // Never print the resolved URL; it usually carries credentials
            println!(
                "  Database URL: {}",
                if config.spec.storage.database_url.is_some() {
                    "(set)"
                } else {
                    "(missing)"
                }
            );
        }
    }
    println!();

    println!("{}", "Roles:".bold());
    if config.spec.roles.is_empty() {
        println!("  {}", "(none configured)".dimmed());
    }
    for role in &config.spec.roles {
        println!("  {} (level {})", role.key.as_str().bold(), role.level);
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config =
        WardenConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_templates_are_valid_configs() {
        for template in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config =
                warden_core::domain::config::WardenConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_generate_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("warden-config.yaml");

        super::generate(output.clone(), true).await.unwrap();

        let config = warden_core::domain::config::WardenConfig::from_yaml_file(&output).unwrap();
        assert!(!config.spec.roles.is_empty());
    }
}
