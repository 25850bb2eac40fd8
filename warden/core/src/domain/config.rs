// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Warden Configuration Types
//
// Defines the configuration schema for the authorization core, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Policy collection and seeding settings (plugin directory, state file)
// - Storage backend selection (in-memory or PostgreSQL)
// - Role catalog for the in-memory backend
// - Logging settings

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::domain::repository::{PostgresConfig, StorageBackend};
use crate::domain::role::{RoleCatalog, RoleDefinition, RoleKey};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "WardenConfig";

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "WardenConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: WardenConfigSpec,
}

pub type WardenConfig = WardenConfigManifest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Deployment name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfigSpec {
    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Role catalog used by the in-memory backend. With PostgreSQL the catalog
    /// is read from the `roles` table instead.
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Directory containing one sub-directory per installed plugin
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,

    /// Where the last-seen policy state is kept for drift reporting
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Maximum depth below `plugins_dir` at which `plugin.json` is looked for
    #[serde(default = "default_manifest_depth")]
    pub manifest_depth: usize,

    /// Role every authenticated user implicitly holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_role: Option<RoleKey>,

    /// Fail seeding when collection produced error diagnostics
    #[serde(default)]
    pub strict: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            state_file: default_state_file(),
            manifest_depth: default_manifest_depth(),
            baseline_role: None,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// PostgreSQL connection string (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("./plugins")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./.warden/policy-state.json")
}

fn default_manifest_depth() -> usize {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for WardenConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "warden".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: WardenConfigSpec::default(),
        }
    }
}

impl WardenConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. WARDEN_CONFIG_PATH environment variable
    /// 2. ./warden-config.yaml (working directory)
    /// 3. ~/.warden/config.yaml (user home)
    /// 4. /etc/warden/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WARDEN_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./warden-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".warden").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/warden/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (Env -> Cwd -> Home -> System)
        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("WARDEN_DATABASE_URL") {
            if !url.trim().is_empty() {
                tracing::info!("Environment override: WARDEN_DATABASE_URL (backend=postgres)");
                self.spec.storage.backend = StorageBackendKind::Postgres;
                self.spec.storage.database_url = Some(url);
            }
        }

        if let Ok(dir) = std::env::var("WARDEN_PLUGINS_DIR") {
            tracing::info!("Environment override: WARDEN_PLUGINS_DIR={}", dir);
            self.spec.policy.plugins_dir = PathBuf::from(dir);
        }

        if let Ok(file) = std::env::var("WARDEN_POLICY_STATE_FILE") {
            tracing::info!("Environment override: WARDEN_POLICY_STATE_FILE={}", file);
            self.spec.policy.state_file = PathBuf::from(file);
        }
    }

    /// Resolve `spec.storage.database_url`, expanding an `env:VAR_NAME` reference.
    pub fn database_url(&self) -> anyhow::Result<Option<String>> {
        match self.spec.storage.database_url.as_deref() {
            None => Ok(None),
            Some(raw) => match raw.strip_prefix("env:") {
                Some(var) => std::env::var(var).map(Some).map_err(|_| {
                    anyhow::anyhow!(
                        "Environment variable '{}' referenced by database_url is not set",
                        var
                    )
                }),
                None => Ok(Some(raw.to_string())),
            },
        }
    }

    /// Storage backend described by this configuration.
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.spec.storage.backend {
            StorageBackendKind::InMemory => Ok(StorageBackend::InMemory),
            StorageBackendKind::Postgres => {
                let connection_string = self.database_url()?.ok_or_else(|| {
                    anyhow::anyhow!(
                        "spec.storage.database_url is required for the postgres backend"
                    )
                })?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig { connection_string }))
            }
        }
    }

    pub fn role_catalog(&self) -> RoleCatalog {
        RoleCatalog::new(self.spec.roles.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.policy.manifest_depth == 0 {
            anyhow::bail!("spec.policy.manifest_depth must be at least 1");
        }

        if self.spec.storage.backend == StorageBackendKind::Postgres
            && self.spec.storage.database_url.as_deref().map(str::trim).unwrap_or("").is_empty()
        {
            anyhow::bail!("spec.storage.database_url is required for the postgres backend");
        }

        let mut seen = HashSet::new();
        for role in &self.spec.roles {
            if role.key.as_str().trim().is_empty() {
                anyhow::bail!("Role key cannot be empty in spec.roles");
            }
            if !seen.insert(role.key.clone()) {
                anyhow::bail!("Duplicate role key '{}' in spec.roles", role.key);
            }
        }

        if let Some(baseline) = &self.spec.policy.baseline_role {
            if self.spec.storage.backend == StorageBackendKind::InMemory
                && !seen.contains(baseline)
            {
                anyhow::bail!("Baseline role '{}' not found in spec.roles", baseline);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let config = WardenConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert_eq!(config.spec.policy.manifest_depth, 2);
        assert_eq!(config.spec.storage.backend, StorageBackendKind::InMemory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: WardenConfig
metadata:
  name: staging
spec:
  policy:
    plugins_dir: /srv/platform/plugins
    baseline_role: member
  storage:
    backend: postgres
    database_url: "env:PLATFORM_DB"
  roles:
    - key: member
      label: Member
      level: 0
    - key: editor
      label: Editor
      level: 20
"#;
        let config = WardenConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec.policy.plugins_dir, PathBuf::from("/srv/platform/plugins"));
        assert_eq!(config.spec.policy.state_file, PathBuf::from("./.warden/policy-state.json"));
        assert_eq!(config.spec.policy.baseline_role, Some(RoleKey::new("member")));
        assert_eq!(config.spec.storage.backend, StorageBackendKind::Postgres);
        assert_eq!(config.role_catalog().len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = WardenConfig::default();

        config.api_version = "wrong/v1".to_string();
        assert!(config.validate().is_err());
        config.api_version = API_VERSION.to_string();

        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.spec.storage.backend = StorageBackendKind::Postgres;
        assert!(config.validate().is_err());
        config.spec.storage.backend = StorageBackendKind::InMemory;

        config.spec.roles = vec![
            RoleDefinition::new("editor", "Editor", 20),
            RoleDefinition::new("editor", "Editor again", 30),
        ];
        assert!(config.validate().is_err());

        config.spec.roles = vec![RoleDefinition::new("editor", "Editor", 20)];
        config.spec.policy.baseline_role = Some(RoleKey::new("member"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_url_plain() {
        let mut config = WardenConfig::default();
        assert_eq!(config.database_url().unwrap(), None);

        config.spec.storage.database_url = Some("postgres://localhost/warden".into());
        assert_eq!(config.database_url().unwrap().as_deref(), Some("postgres://localhost/warden"));

        config.spec.storage.database_url = Some("env:WARDEN_TEST_SURELY_UNSET_VAR".into());
        assert!(config.database_url().is_err());
    }
}
